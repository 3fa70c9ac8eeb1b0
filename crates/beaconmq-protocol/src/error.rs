//! Encoding, packet and transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("payload exceeds maximum message size of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("serialisation error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("malformed remaining length")]
    MalformedLength,

    #[error("packet of {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    #[error("unsupported packet type {0:#04x}")]
    UnsupportedType(u8),

    #[error("string field longer than 65535 bytes")]
    StringTooLong,

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("truncated {0} packet")]
    Truncated(&'static str),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("broker refused connection: return code {0}")]
    Refused(u8),

    #[error("subscription to {0} rejected")]
    SubscribeRejected(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("not connected")]
    NotConnected,

    #[error("message of {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
