//! Broker transport abstraction.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

/// Credentials presented on connect, in descending specificity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Anonymous,
    Username(String),
    UsernamePassword { username: String, password: String },
}

impl Credentials {
    /// Pick the most specific credentials the non-empty fields allow.
    ///
    /// A password without a username cannot be presented and is ignored.
    pub fn from_fields(username: &str, password: &str) -> Self {
        match (username.is_empty(), password.is_empty()) {
            (false, false) => Self::UsernamePassword {
                username: username.to_string(),
                password: password.to_string(),
            },
            (false, true) => Self::Username(username.to_string()),
            (true, _) => Self::Anonymous,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Username(username) | Self::UsernamePassword { username, .. } => Some(username),
        }
    }

    pub fn password(&self) -> Option<&str> {
        match self {
            Self::UsernamePassword { password, .. } => Some(password),
            _ => None,
        }
    }
}

/// Everything needed to open a broker session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Credentials,
    pub keep_alive: Duration,
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A publish/subscribe connection to a message broker.
///
/// Only `connect`, `subscribe` and `publish` may wait on the network; the
/// rest must return promptly so the control loop can poll every tick.
#[async_trait]
pub trait BrokerTransport: Send + 'static {
    /// Open a session with the broker.
    async fn connect(&mut self, options: &ConnectOptions) -> Result<(), TransportError>;

    /// Subscribe to a single topic.
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Publish a payload to a topic.
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Pending network housekeeping (keep-alive). Must not block.
    async fn service(&mut self) -> Result<(), TransportError>;

    /// Take the next inbound message, if one has arrived.
    fn try_recv(&mut self) -> Option<InboundMessage>;

    /// Whether the underlying link is still alive.
    fn is_connected(&self) -> bool;

    /// Close the session. Safe to call when already disconnected.
    async fn disconnect(&mut self);

    /// Largest payload `publish` accepts.
    fn max_message_size(&self) -> usize;
}
