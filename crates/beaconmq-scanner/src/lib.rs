//! Scan driver abstraction for beaconmq.
//!
//! This crate defines the [`ScanDriver`] trait that radio backends must
//! implement. [`ReplayScanner`] replays recorded advertisements on hosts
//! without a radio; the `mock` feature adds a scripted driver for tests.

use std::time::Duration;

use async_trait::async_trait;
use beaconmq_types::AdvertisementRecord;

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod replay;

pub use error::ScanError;
pub use replay::ReplayScanner;

/// Runs bounded-duration advertisement scans.
///
/// A scan cannot be cancelled once started; it occupies the caller for the
/// whole duration.
#[async_trait]
pub trait ScanDriver: Send + 'static {
    /// Scan for `duration`, appending every discovered peer to `results`.
    async fn start_scan(
        &mut self,
        duration: Duration,
        results: &mut Vec<AdvertisementRecord>,
    ) -> Result<(), ScanError>;

    /// Release the driver's internal result buffer.
    fn clear_results(&mut self);
}
