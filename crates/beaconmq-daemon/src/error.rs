//! Daemon errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("scan error: {0}")]
    Scan(#[from] beaconmq_scanner::ScanError),

    #[error("encode error: {0}")]
    Encode(#[from] beaconmq_protocol::EncodeError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
}

/// Why a publish did not happen.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("not connected to broker")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(#[from] beaconmq_protocol::TransportError),
}
