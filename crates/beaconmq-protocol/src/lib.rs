//! Payload encoding and broker transport for beaconmq.
//!
//! This crate turns a scan cycle's records into one size-bounded JSON
//! payload, and defines the [`BrokerTransport`] trait the daemon publishes
//! through. [`MqttTransport`] speaks MQTT 3.1.1 over TCP; the `mock` feature
//! adds an in-memory transport for tests.

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod mqtt;
pub mod packet;
pub mod payload;
pub mod transport;

pub use error::{EncodeError, PacketError, TransportError};
pub use mqtt::MqttTransport;
pub use payload::{decode, encode};
pub use transport::{BrokerTransport, ConnectOptions, Credentials, InboundMessage};

/// Largest single MQTT message the transport will send or accept, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 4096;
