//! Core daemon for beaconmq.
//!
//! Implements the scan scheduler, the broker connection state machine, and
//! the control loop that ties them to a scan driver and a broker transport.

pub mod broker;
pub mod config;
pub mod daemon;
pub mod error;
pub mod scheduler;
pub mod settings;
pub mod setup;
pub mod state;

pub use broker::{BrokerLink, ConnectOutcome};
pub use config::Config;
pub use daemon::{AlwaysOnline, Connectivity, Daemon, DaemonEvent, DaemonStatus};
pub use error::{DaemonError, PublishError};
pub use scheduler::ScanScheduler;
pub use settings::{Settings, SettingsWatch};
pub use state::ConnectionState;
