//! Replay backend: reports recorded advertisements instead of listening.
//!
//! The replay file is a JSON array of records in the same shape as the
//! published payload. Every scan waits out its full duration, then reports
//! each address once, keeping the last advertisement seen for it.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use beaconmq_types::AdvertisementRecord;
use tracing::debug;

use crate::error::ScanError;
use crate::ScanDriver;

pub struct ReplayScanner {
    recording: Vec<AdvertisementRecord>,
    buffer: Vec<AdvertisementRecord>,
}

impl ReplayScanner {
    pub fn from_records(recording: Vec<AdvertisementRecord>) -> Self {
        Self {
            recording,
            buffer: Vec::new(),
        }
    }

    /// Load a recording from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ScanError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Replay(format!("{}: {e}", path.display())))?;
        let recording: Vec<AdvertisementRecord> = serde_json::from_str(&content)
            .map_err(|e| ScanError::Replay(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), records = recording.len(), "loaded replay recording");
        Ok(Self::from_records(recording))
    }

    fn collect(&mut self) {
        self.buffer.clear();
        for record in &self.recording {
            if let Some(seen) = self.buffer.iter_mut().find(|r| r.address == record.address) {
                seen.clone_from(record);
            } else {
                self.buffer.push(record.clone());
            }
        }
    }
}

#[async_trait]
impl ScanDriver for ReplayScanner {
    async fn start_scan(
        &mut self,
        duration: Duration,
        results: &mut Vec<AdvertisementRecord>,
    ) -> Result<(), ScanError> {
        tokio::time::sleep(duration).await;
        self.collect();
        results.extend_from_slice(&self.buffer);
        Ok(())
    }

    fn clear_results(&mut self) {
        self.buffer = Vec::new();
    }
}
