//! Shared types for beaconmq.
//!
//! This crate contains the types shared across the beaconmq workspace: device
//! addresses and the advertisement records produced by a scan cycle.

pub mod address;
pub mod record;

pub use address::{AddressError, BdAddr};
pub use record::AdvertisementRecord;
