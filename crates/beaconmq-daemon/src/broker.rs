//! Broker connection state machine: connect, subscribe, detect loss,
//! rate-limited reconnect, publish, and inbound command dispatch.

use std::time::Duration;

use beaconmq_protocol::{BrokerTransport, ConnectOptions, InboundMessage};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PublishError;
use crate::scheduler::ScanScheduler;
use crate::settings::Settings;
use crate::state::ConnectionState;

/// Minimum spacing between the starts of two connect attempts.
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// Topic suffix inbound commands arrive on.
pub const COMMAND_TOPIC_SUFFIX: &str = "cmd";

/// Command payload that triggers an immediate scan.
pub const SCAN_COMMAND: &[u8] = b"scan";

/// Result of [`BrokerLink::try_connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Not attempted: inside the retry window, not disconnected, or no
    /// broker host configured.
    Skipped,
    /// Connect or subscribe failed; back to `Disconnected`.
    Failed,
    /// Connected and subscribed to the command topic.
    Subscribed,
}

/// Owns the transport and the connection lifecycle.
pub struct BrokerLink {
    transport: Box<dyn BrokerTransport>,
    state: ConnectionState,
    last_attempt: Option<Instant>,
    topic_prefix: String,
    client_id: String,
    keep_alive: Duration,
}

impl BrokerLink {
    pub fn new(transport: Box<dyn BrokerTransport>, keep_alive: Duration) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            transport,
            state: ConnectionState::Disconnected,
            last_attempt: None,
            topic_prefix: String::new(),
            client_id: format!("beaconmq-{}", &id[..8]),
            keep_alive,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Full topic for a suffix under the prefix of the current session.
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.topic_prefix)
    }

    pub fn max_message_size(&self) -> usize {
        self.transport.max_message_size()
    }

    /// Service pending network I/O: keep-alive, liveness, inbound commands.
    ///
    /// Does nothing unless subscribed.
    pub async fn service(&mut self, now: Instant, scheduler: &mut ScanScheduler) {
        if !self.state.is_subscribed() {
            return;
        }

        if let Err(e) = self.transport.service().await {
            debug!(error = %e, "transport housekeeping failed");
        }

        while let Some(message) = self.transport.try_recv() {
            self.handle_inbound(&message, now, scheduler);
        }

        self.check_liveness().await;
    }

    /// Drop to `Disconnected` if the transport reports the link gone.
    pub async fn check_liveness(&mut self) {
        if self.state.is_subscribed() && !self.transport.is_connected() {
            warn!("broker connection lost");
            self.transport.disconnect().await;
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Attempt to connect and subscribe, subject to the retry floor.
    ///
    /// Attempts inside [`CONNECT_RETRY_INTERVAL`] of the previous attempt's
    /// start are skipped without touching the transport.
    pub async fn try_connect(&mut self, now: Instant, settings: &Settings) -> ConnectOutcome {
        if self.state != ConnectionState::Disconnected {
            return ConnectOutcome::Skipped;
        }
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < CONNECT_RETRY_INTERVAL {
                return ConnectOutcome::Skipped;
            }
        }
        if settings.broker_host.is_empty() {
            return ConnectOutcome::Skipped;
        }

        self.last_attempt = Some(now);
        self.state = ConnectionState::Connecting;
        self.topic_prefix = settings.topic_prefix().to_string();

        let options = ConnectOptions {
            host: settings.broker_host.clone(),
            port: settings.port(),
            client_id: self.client_id.clone(),
            credentials: settings.credentials(),
            keep_alive: self.keep_alive,
        };
        info!(host = %options.host, port = options.port, "connecting to broker");

        if let Err(e) = self.transport.connect(&options).await {
            warn!(error = %e, host = %options.host, "broker connect failed");
            self.state = ConnectionState::Disconnected;
            return ConnectOutcome::Failed;
        }

        let command_topic = self.topic(COMMAND_TOPIC_SUFFIX);
        if let Err(e) = self.transport.subscribe(&command_topic).await {
            warn!(error = %e, topic = %command_topic, "command subscription failed");
            self.transport.disconnect().await;
            self.state = ConnectionState::Disconnected;
            return ConnectOutcome::Failed;
        }

        self.state = ConnectionState::Subscribed;
        info!(topic = %command_topic, "subscribed to command topic");
        ConnectOutcome::Subscribed
    }

    /// Publish to `{topic_prefix}/{topic_suffix}`. Only valid while
    /// subscribed; nothing is queued for later.
    pub async fn publish(&mut self, topic_suffix: &str, payload: &[u8]) -> Result<(), PublishError> {
        if !self.state.is_subscribed() {
            return Err(PublishError::NotConnected);
        }

        let topic = self.topic(topic_suffix);
        if let Err(e) = self.transport.publish(&topic, payload).await {
            self.check_liveness().await;
            return Err(e.into());
        }
        debug!(topic = %topic, bytes = payload.len(), "published");
        Ok(())
    }

    /// Close the current session, if any. The retry floor still applies to
    /// the next attempt.
    pub async fn reset(&mut self) {
        if self.state != ConnectionState::Disconnected {
            info!("closing broker session");
            self.transport.disconnect().await;
            self.state = ConnectionState::Disconnected;
        }
    }

    fn handle_inbound(&self, message: &InboundMessage, now: Instant, scheduler: &mut ScanScheduler) {
        if message.topic != self.topic(COMMAND_TOPIC_SUFFIX) {
            debug!(topic = %message.topic, "ignoring message on unexpected topic");
            return;
        }
        if message.payload == SCAN_COMMAND {
            info!("scan requested by command");
            scheduler.force(now);
        } else {
            debug!(payload = %String::from_utf8_lossy(&message.payload), "ignoring unknown command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaconmq_protocol::mock::MockTransport;
    use beaconmq_protocol::Credentials;

    fn settings() -> Settings {
        Settings {
            broker_host: "broker.local".to_string(),
            topic_prefix: "lab".to_string(),
            ..Settings::default()
        }
    }

    fn link() -> (BrokerLink, beaconmq_protocol::mock::MockTransportHandle) {
        let transport = MockTransport::new();
        let handle = transport.handle();
        (
            BrokerLink::new(Box::new(transport), Duration::from_secs(15)),
            handle,
        )
    }

    #[tokio::test]
    async fn connect_subscribes_to_command_topic() {
        let (mut link, handle) = link();
        let now = Instant::now();
        assert_eq!(link.try_connect(now, &settings()).await, ConnectOutcome::Subscribed);
        assert_eq!(link.state(), ConnectionState::Subscribed);
        assert_eq!(handle.subscriptions(), vec!["lab/cmd".to_string()]);

        let attempt = &handle.connect_attempts()[0];
        assert_eq!(attempt.host, "broker.local");
        assert_eq!(attempt.port, 1883);
        assert_eq!(attempt.credentials, Credentials::Anonymous);
        assert_eq!(attempt.client_id, link.client_id());
    }

    #[tokio::test]
    async fn credentials_are_passed_by_specificity() {
        let (mut link, handle) = link();
        let with_user = Settings {
            broker_username: "scanner".to_string(),
            ..settings()
        };
        link.try_connect(Instant::now(), &with_user).await;
        assert_eq!(
            handle.connect_attempts()[0].credentials,
            Credentials::Username("scanner".to_string())
        );
    }

    #[tokio::test]
    async fn failed_connect_returns_to_disconnected() {
        let (mut link, handle) = link();
        handle.set_fail_connect(true);
        let outcome = link.try_connect(Instant::now(), &settings()).await;
        assert_eq!(outcome, ConnectOutcome::Failed);
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(handle.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn failed_subscribe_disconnects() {
        let (mut link, handle) = link();
        handle.set_fail_subscribe(true);
        let outcome = link.try_connect(Instant::now(), &settings()).await;
        assert_eq!(outcome, ConnectOutcome::Failed);
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn attempts_inside_retry_window_are_skipped() {
        let (mut link, handle) = link();
        handle.set_fail_connect(true);
        let t0 = Instant::now();

        assert_eq!(link.try_connect(t0, &settings()).await, ConnectOutcome::Failed);
        let second = link
            .try_connect(t0 + Duration::from_millis(999), &settings())
            .await;
        assert_eq!(second, ConnectOutcome::Skipped);
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(handle.connect_attempts().len(), 1);

        let third = link
            .try_connect(t0 + Duration::from_millis(1000), &settings())
            .await;
        assert_eq!(third, ConnectOutcome::Failed);
        assert_eq!(handle.connect_attempts().len(), 2);
    }

    #[tokio::test]
    async fn missing_host_skips_attempt() {
        let (mut link, handle) = link();
        let outcome = link.try_connect(Instant::now(), &Settings::default()).await;
        assert_eq!(outcome, ConnectOutcome::Skipped);
        assert!(handle.connect_attempts().is_empty());
    }

    #[tokio::test]
    async fn publish_requires_subscribed() {
        let (mut link, handle) = link();
        let err = link.publish("data", b"[]").await.unwrap_err();
        assert!(matches!(err, PublishError::NotConnected));
        assert!(handle.published().is_empty());

        link.try_connect(Instant::now(), &settings()).await;
        link.publish("data", b"[]").await.unwrap();
        let published = handle.published();
        assert_eq!(published[0].topic, "lab/data");
        assert_eq!(published[0].payload, b"[]");
    }

    #[tokio::test]
    async fn publish_failure_on_dead_link_disconnects() {
        let (mut link, handle) = link();
        link.try_connect(Instant::now(), &settings()).await;
        handle.drop_link();
        let err = link.publish("data", b"[]").await.unwrap_err();
        assert!(matches!(err, PublishError::Transport(_)));
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn service_detects_lost_link() {
        let (mut link, handle) = link();
        let now = Instant::now();
        let mut scheduler = ScanScheduler::new(60, 5, now);
        link.try_connect(now, &settings()).await;

        handle.drop_link();
        link.service(now, &mut scheduler).await;
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn scan_command_forces_schedule() {
        let (mut link, handle) = link();
        let t0 = Instant::now();
        let mut scheduler = ScanScheduler::new(60, 5, t0);
        scheduler.on_scan_completed(t0);
        link.try_connect(t0, &settings()).await;

        let received = t0 + Duration::from_secs(3);
        handle.inject("lab/cmd", b"reboot");
        handle.inject("other/cmd", b"scan");
        link.service(received, &mut scheduler).await;
        assert!(!scheduler.is_due(received));

        handle.inject("lab/cmd", b"scan");
        link.service(received, &mut scheduler).await;
        assert_eq!(scheduler.next_scan_due_at(), Some(received));
    }

    #[tokio::test]
    async fn reset_closes_session() {
        let (mut link, handle) = link();
        link.try_connect(Instant::now(), &settings()).await;
        link.reset().await;
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(handle.disconnect_count(), 1);
    }
}
