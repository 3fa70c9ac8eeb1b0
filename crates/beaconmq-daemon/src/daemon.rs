//! Core daemon orchestration: the per-tick control loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beaconmq_protocol::BrokerTransport;
use beaconmq_scanner::ScanDriver;
use beaconmq_types::AdvertisementRecord;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::broker::BrokerLink;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, PublishError};
use crate::scheduler::ScanScheduler;
use crate::settings::{Settings, SettingsWatch};
use crate::state::ConnectionState;

/// Topic suffix scan payloads are published to.
pub const DATA_TOPIC_SUFFIX: &str = "data";

/// Events processed by the daemon's main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonEvent {
    /// Run a scan on the next tick, as if a scan command had arrived.
    ScanNow,
    /// Shutdown signal.
    Shutdown,
}

/// Snapshot of daemon state, published after every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonStatus {
    pub connection: ConnectionState,
    pub scans_completed: u64,
    /// Records reported by the most recent successful scan.
    pub last_scan_records: usize,
    pub payloads_published: u64,
    /// Scan cycles whose payload was not published.
    pub payloads_dropped: u64,
    /// `None` while recurring scans are disabled.
    pub next_scan_in: Option<Duration>,
}

/// Whether the host currently has a network path to the broker.
pub trait Connectivity: Send + 'static {
    fn is_online(&self) -> bool;
}

/// Connectivity for hosts where the OS manages the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

impl Connectivity for Arc<AtomicBool> {
    fn is_online(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// The beaconmq daemon.
pub struct Daemon {
    settings_watch: SettingsWatch,
    settings: Settings,
    scheduler: ScanScheduler,
    broker: BrokerLink,
    scanner: Box<dyn ScanDriver>,
    connectivity: Box<dyn Connectivity>,
    /// Loop-owned scan buffer, refilled by every scan.
    records: Vec<AdvertisementRecord>,
    tick_period: Duration,
    status: DaemonStatus,
    event_tx: mpsc::Sender<DaemonEvent>,
    event_rx: mpsc::Receiver<DaemonEvent>,
    status_tx: watch::Sender<DaemonStatus>,
}

impl Daemon {
    /// Create a new daemon instance.
    ///
    /// The first recurring scan, if enabled, is due immediately.
    pub fn new(
        config: &DaemonConfig,
        settings_watch: SettingsWatch,
        transport: Box<dyn BrokerTransport>,
        scanner: Box<dyn ScanDriver>,
    ) -> Self {
        let settings = settings_watch.snapshot();
        let scheduler = ScanScheduler::from_settings(&settings, Instant::now());
        let broker = BrokerLink::new(transport, Duration::from_secs(config.keep_alive_seconds));
        let (event_tx, event_rx) = mpsc::channel(64);
        let (status_tx, _) = watch::channel(DaemonStatus::default());

        Self {
            settings_watch,
            settings,
            scheduler,
            broker,
            scanner,
            connectivity: Box::new(AlwaysOnline),
            records: Vec::new(),
            tick_period: Duration::from_millis(config.tick_ms.max(1)),
            status: DaemonStatus::default(),
            event_tx,
            event_rx,
            status_tx,
        }
    }

    /// Replace the connectivity source (defaults to [`AlwaysOnline`]).
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Box<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Get a clone of the event sender for feeding events into the daemon.
    pub fn event_sender(&self) -> mpsc::Sender<DaemonEvent> {
        self.event_tx.clone()
    }

    /// Subscribe to status snapshots.
    pub fn status_receiver(&self) -> watch::Receiver<DaemonStatus> {
        self.status_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.broker.state()
    }

    /// Run the daemon event loop until shutdown.
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        info!(
            client_id = %self.broker.client_id(),
            tick_ms = u64::try_from(self.tick_period.as_millis()).unwrap_or(u64::MAX),
            "daemon running"
        );

        let mut ticker = tokio::time::interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(DaemonEvent::ScanNow) => {
                            info!("scan requested locally");
                            self.scheduler.force(Instant::now());
                        }
                        Some(DaemonEvent::Shutdown) | None => {
                            info!("shutting down");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// One pass of the control loop.
    ///
    /// Applies a saved configuration, services the broker link, reconnects
    /// when offline from the broker, and runs a scan cycle when one is due.
    /// Only the scan itself may suspend for long.
    pub async fn tick(&mut self) {
        self.apply_settings_change().await;

        let now = Instant::now();
        self.broker.service(now, &mut self.scheduler).await;

        if self.broker.state() == ConnectionState::Disconnected && self.connectivity.is_online() {
            self.broker.try_connect(now, &self.settings).await;
        }

        if self.broker.state().is_subscribed() && self.scheduler.is_due(Instant::now()) {
            self.run_scan_cycle().await;
        }

        self.publish_status();
    }

    async fn apply_settings_change(&mut self) {
        let Some(settings) = self.settings_watch.take_changed() else {
            return;
        };

        info!(
            interval_secs = settings.scan_interval_seconds(),
            duration_secs = settings.scan_duration_seconds(),
            "configuration saved"
        );
        self.scheduler.apply_settings(&settings, Instant::now());

        if self.settings.broker_differs(&settings) {
            info!(host = %settings.broker_host, "broker settings changed, reconnecting");
            self.broker.reset().await;
        }
        self.settings = settings;
    }

    async fn run_scan_cycle(&mut self) {
        let duration = self.scheduler.scan_duration();
        info!(duration_secs = duration.as_secs(), "starting scan");

        match self.scan_and_publish(duration).await {
            Ok(()) => self.status.payloads_published += 1,
            Err(e) => {
                warn!(error = %e, "scan results dropped");
                self.status.payloads_dropped += 1;
            }
        }
        self.scanner.clear_results();

        self.status.scans_completed += 1;
        self.scheduler.on_scan_completed(Instant::now());
    }

    async fn scan_and_publish(&mut self, duration: Duration) -> Result<(), DaemonError> {
        self.records.clear();
        self.scanner.start_scan(duration, &mut self.records).await?;
        info!(records = self.records.len(), "scan complete");
        self.status.last_scan_records = self.records.len();
        self.publish_records().await
    }

    async fn publish_records(&mut self) -> Result<(), DaemonError> {
        self.broker.check_liveness().await;
        if !self.broker.state().is_subscribed() {
            return Err(PublishError::NotConnected.into());
        }

        let payload = beaconmq_protocol::encode(&self.records, self.broker.max_message_size())?;
        self.broker.publish(DATA_TOPIC_SUFFIX, &payload).await?;
        debug!(bytes = payload.len(), "scan payload published");
        Ok(())
    }

    fn publish_status(&mut self) {
        let now = Instant::now();
        self.status.connection = self.broker.state();
        self.status.next_scan_in = self
            .scheduler
            .next_scan_due_at()
            .map(|due| due.saturating_duration_since(now));
        self.status_tx.send_replace(self.status.clone());
    }

    async fn shutdown(&mut self) {
        self.broker.reset().await;
        self.publish_status();
        info!("daemon shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaconmq_protocol::mock::MockTransport;
    use beaconmq_scanner::mock::MockScanner;

    fn daemon_with(settings: Settings) -> Daemon {
        let (_tx, watch) = SettingsWatch::new(settings);
        Daemon::new(
            &DaemonConfig::default(),
            watch,
            Box::new(MockTransport::new()),
            Box::new(MockScanner::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn status_starts_disconnected() {
        let daemon = daemon_with(Settings::default());
        let status = daemon.status_receiver().borrow().clone();
        assert_eq!(status.connection, ConnectionState::Disconnected);
        assert_eq!(status.scans_completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_host_does_not_connect() {
        let online = Arc::new(AtomicBool::new(false));
        let mut daemon = daemon_with(Settings {
            broker_host: "broker.local".to_string(),
            ..Settings::default()
        })
        .with_connectivity(Box::new(Arc::clone(&online)));

        daemon.tick().await;
        assert_eq!(daemon.connection_state(), ConnectionState::Disconnected);

        online.store(true, Ordering::Relaxed);
        daemon.tick().await;
        assert_eq!(daemon.connection_state(), ConnectionState::Subscribed);
    }

    #[tokio::test]
    async fn tick_period_has_floor() {
        let (_tx, watch) = SettingsWatch::new(Settings::default());
        let config = DaemonConfig {
            tick_ms: 0,
            ..DaemonConfig::default()
        };
        let daemon = Daemon::new(
            &config,
            watch,
            Box::new(MockTransport::new()),
            Box::new(MockScanner::new()),
        );
        assert_eq!(daemon.tick_period, Duration::from_millis(1));
    }
}
