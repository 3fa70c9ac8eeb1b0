//! Mock broker transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::TransportError;
use crate::transport::{BrokerTransport, ConnectOptions, InboundMessage};
use crate::MAX_MESSAGE_SIZE;

/// Recorded publish for test observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Shared state for observing what `MockTransport` did.
#[derive(Debug, Default)]
struct MockTransportState {
    connect_attempts: Vec<ConnectOptions>,
    subscriptions: Vec<String>,
    published: Vec<PublishedMessage>,
    inbound: VecDeque<InboundMessage>,
    connected: bool,
    fail_connect: bool,
    fail_subscribe: bool,
    fail_publish: bool,
    disconnects: usize,
}

/// In-memory broker transport.
///
/// Connects instantly unless told to fail. Inbound messages are injected
/// through a [`MockTransportHandle`].
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
    max_message_size: usize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_max_message_size(MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockTransportState::default())),
            max_message_size,
        }
    }

    /// Get a clonable handle for driving and observing the transport.
    pub fn handle(&self) -> MockTransportHandle {
        MockTransportHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Clonable observer handle for `MockTransport`.
#[derive(Clone)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransportHandle {
    /// Every `connect` call that reached the transport.
    pub fn connect_attempts(&self) -> Vec<ConnectOptions> {
        self.state.lock().unwrap().connect_attempts.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    /// Queue a message as if the broker had delivered it.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        self.state.lock().unwrap().inbound.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Simulate the link dropping underneath the client.
    pub fn drop_link(&self) {
        self.state.lock().unwrap().connected = false;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.state.lock().unwrap().fail_subscribe = fail;
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.state.lock().unwrap().fail_publish = fail;
    }
}

#[async_trait]
impl BrokerTransport for MockTransport {
    async fn connect(&mut self, options: &ConnectOptions) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.connect_attempts.push(options.clone());
        if state.fail_connect {
            state.connected = false;
            return Err(TransportError::Connection("mock connect failure".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.fail_subscribe {
            return Err(TransportError::SubscribeRejected(topic.to_string()));
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: payload.len(),
                max: self.max_message_size,
            });
        }
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.fail_publish {
            return Err(TransportError::Connection("mock publish failure".to_string()));
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn service(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn try_recv(&mut self) -> Option<InboundMessage> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return None;
        }
        state.inbound.pop_front()
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn disconnect(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.connected {
            state.disconnects += 1;
        }
        state.connected = false;
    }

    fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}
