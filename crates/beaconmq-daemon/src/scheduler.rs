//! Scan scheduling: when the next scan is due and how long it runs.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::settings::Settings;

/// Decides when scans run.
///
/// `next_scan_due_at == None` means automatic scanning is disabled until
/// something re-arms it: a scan command, or the interval going from 0 to a
/// positive value.
#[derive(Debug, Clone)]
pub struct ScanScheduler {
    next_scan_due_at: Option<Instant>,
    scan_interval_seconds: u64,
    scan_duration_seconds: u64,
}

impl ScanScheduler {
    /// Create a scheduler. A positive interval arms the first scan at `now`.
    pub fn new(scan_interval_seconds: u64, scan_duration_seconds: u64, now: Instant) -> Self {
        Self {
            next_scan_due_at: (scan_interval_seconds > 0).then_some(now),
            scan_interval_seconds,
            scan_duration_seconds,
        }
    }

    pub fn from_settings(settings: &Settings, now: Instant) -> Self {
        Self::new(
            settings.scan_interval_seconds(),
            settings.scan_duration_seconds(),
            now,
        )
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_scan_due_at.is_some_and(|due| now >= due)
    }

    pub fn on_scan_completed(&mut self, now: Instant) {
        if self.scan_interval_seconds > 0 {
            self.next_scan_due_at = now.checked_add(Duration::from_secs(self.scan_interval_seconds));
            if self.next_scan_due_at.is_some() {
                debug!(interval_secs = self.scan_interval_seconds, "next scan scheduled");
            } else {
                warn!(
                    interval_secs = self.scan_interval_seconds,
                    "scan interval out of range, waiting for a scan command"
                );
            }
        } else {
            self.next_scan_due_at = None;
            debug!("recurring scans disabled, waiting for a scan command");
        }
    }

    /// Make a scan due immediately, overriding any pending schedule.
    pub fn force(&mut self, now: Instant) {
        self.next_scan_due_at = Some(now);
    }

    /// Take new interval and duration values from a configuration change.
    pub fn apply_settings(&mut self, settings: &Settings, now: Instant) {
        let interval = settings.scan_interval_seconds();
        if self.scan_interval_seconds == 0 && interval > 0 {
            info!(interval_secs = interval, "recurring scans enabled");
            self.next_scan_due_at = Some(now);
        }
        self.scan_interval_seconds = interval;
        self.scan_duration_seconds = settings.scan_duration_seconds();
    }

    /// Duration for the scan about to start, never below one second.
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_seconds.max(1))
    }

    pub fn next_scan_due_at(&self) -> Option<Instant> {
        self.next_scan_due_at
    }

    pub fn scan_interval_seconds(&self) -> u64 {
        self.scan_interval_seconds
    }
}
