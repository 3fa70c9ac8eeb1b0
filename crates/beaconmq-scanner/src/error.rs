//! Scan driver errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to start scan: {0}")]
    Start(String),

    #[error("failed to load replay file: {0}")]
    Replay(String),
}
