//! Mock scan driver for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beaconmq_types::AdvertisementRecord;

use crate::error::ScanError;
use crate::ScanDriver;

type ScanHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct MockScannerState {
    batches: VecDeque<Vec<AdvertisementRecord>>,
    durations: Vec<Duration>,
    clear_calls: usize,
    fail: bool,
    on_scan: Option<ScanHook>,
}

/// Scripted scan driver.
///
/// Each scan sleeps for the requested duration (instant under a paused
/// tokio clock) and reports the next queued batch, or nothing once the
/// queue is empty.
pub struct MockScanner {
    state: Arc<Mutex<MockScannerState>>,
}

impl Default for MockScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScanner {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockScannerState::default())),
        }
    }

    pub fn handle(&self) -> MockScannerHandle {
        MockScannerHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Clonable handle for scripting and observing `MockScanner`.
#[derive(Clone)]
pub struct MockScannerHandle {
    state: Arc<Mutex<MockScannerState>>,
}

impl MockScannerHandle {
    /// Queue the records the next scan will report.
    pub fn push_batch(&self, records: Vec<AdvertisementRecord>) {
        self.state.lock().unwrap().batches.push_back(records);
    }

    /// Durations of every scan started so far.
    pub fn scan_durations(&self) -> Vec<Duration> {
        self.state.lock().unwrap().durations.clone()
    }

    pub fn scan_count(&self) -> usize {
        self.state.lock().unwrap().durations.len()
    }

    pub fn clear_calls(&self) -> usize {
        self.state.lock().unwrap().clear_calls
    }

    /// Run `hook` at the end of every scan, before results are reported.
    pub fn set_on_scan(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.state.lock().unwrap().on_scan = Some(Arc::new(hook));
    }

    /// Make subsequent scans fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }
}

#[async_trait]
impl ScanDriver for MockScanner {
    async fn start_scan(
        &mut self,
        duration: Duration,
        results: &mut Vec<AdvertisementRecord>,
    ) -> Result<(), ScanError> {
        let (batch, fail, hook) = {
            let mut state = self.state.lock().unwrap();
            state.durations.push(duration);
            (
                state.batches.pop_front().unwrap_or_default(),
                state.fail,
                state.on_scan.clone(),
            )
        };

        tokio::time::sleep(duration).await;
        if let Some(hook) = hook {
            hook();
        }

        if fail {
            return Err(ScanError::Start("mock scan failure".to_string()));
        }
        results.extend(batch);
        Ok(())
    }

    fn clear_results(&mut self) {
        self.state.lock().unwrap().clear_calls += 1;
    }
}
