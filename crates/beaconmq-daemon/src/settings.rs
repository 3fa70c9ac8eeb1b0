//! Per-tick configuration snapshot and change notification.

use beaconmq_protocol::Credentials;
use tokio::sync::watch;

use crate::config::{Config, NumericField};

/// Topic prefix used when none is configured.
pub const DEFAULT_TOPIC_PREFIX: &str = "beaconmq";
/// Broker port used when the configured one is missing or invalid.
pub const DEFAULT_BROKER_PORT: u16 = 1883;
/// Scan duration used when the configured one is 0 or unparsable.
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 5;

/// The settings the control loop reads each tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub broker_host: String,
    pub broker_username: String,
    pub broker_password: String,
    pub broker_port: NumericField,
    pub topic_prefix: String,
    pub scan_interval_seconds: NumericField,
    pub scan_duration_seconds: NumericField,
}

impl Settings {
    pub fn port(&self) -> u16 {
        self.broker_port
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_BROKER_PORT)
    }

    /// Blank prefixes fall back to [`DEFAULT_TOPIC_PREFIX`].
    pub fn topic_prefix(&self) -> &str {
        let prefix = self.topic_prefix.trim();
        if prefix.is_empty() {
            DEFAULT_TOPIC_PREFIX
        } else {
            prefix
        }
    }

    /// Recurring scan interval; unparsable values disable recurring scans.
    pub fn scan_interval_seconds(&self) -> u64 {
        self.scan_interval_seconds.as_u64().unwrap_or(0)
    }

    /// Configured scan duration; 0 or unparsable gives the default.
    pub fn scan_duration_seconds(&self) -> u64 {
        self.scan_duration_seconds
            .as_u64()
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_SCAN_DURATION_SECS)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::from_fields(&self.broker_username, &self.broker_password)
    }

    /// Whether switching to `other` requires a new broker session.
    pub fn broker_differs(&self, other: &Self) -> bool {
        self.broker_host != other.broker_host
            || self.port() != other.port()
            || self.credentials() != other.credentials()
            || self.topic_prefix() != other.topic_prefix()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            broker_host: config.broker.host.trim().to_string(),
            broker_username: config.broker.username.clone(),
            broker_password: config.broker.password.clone(),
            broker_port: config.broker.port.clone(),
            topic_prefix: config.broker.topic_prefix.clone(),
            scan_interval_seconds: config.scan.interval_seconds.clone(),
            scan_duration_seconds: config.scan.duration_seconds.clone(),
        }
    }
}

/// Receiving end of the settings channel.
///
/// Every value sent on the paired [`watch::Sender`] counts as one "saved"
/// notification, reported once by [`SettingsWatch::take_changed`].
pub struct SettingsWatch {
    rx: watch::Receiver<Settings>,
}

impl SettingsWatch {
    pub fn new(initial: Settings) -> (watch::Sender<Settings>, Self) {
        let (tx, rx) = watch::channel(initial);
        (tx, Self { rx })
    }

    /// Current settings, without consuming a pending change.
    pub fn snapshot(&self) -> Settings {
        self.rx.borrow().clone()
    }

    /// The new settings if a save happened since the last call.
    pub fn take_changed(&mut self) -> Option<Settings> {
        if self.rx.has_changed().unwrap_or(false) {
            Some(self.rx.borrow_and_update().clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_prefix_falls_back_to_default() {
        let mut settings = Settings::default();
        assert_eq!(settings.topic_prefix(), DEFAULT_TOPIC_PREFIX);
        settings.topic_prefix = "   ".to_string();
        assert_eq!(settings.topic_prefix(), DEFAULT_TOPIC_PREFIX);
        settings.topic_prefix = "yard".to_string();
        assert_eq!(settings.topic_prefix(), "yard");
    }

    #[test]
    fn unparsable_numbers_use_safe_fallbacks() {
        let settings = Settings {
            broker_port: "not-a-port".into(),
            scan_interval_seconds: "soon".into(),
            scan_duration_seconds: "long".into(),
            ..Settings::default()
        };
        assert_eq!(settings.port(), DEFAULT_BROKER_PORT);
        assert_eq!(settings.scan_interval_seconds(), 0);
        assert_eq!(settings.scan_duration_seconds(), DEFAULT_SCAN_DURATION_SECS);
    }

    #[test]
    fn zero_values() {
        let settings = Settings {
            broker_port: 0.into(),
            scan_interval_seconds: 0.into(),
            scan_duration_seconds: 0.into(),
            ..Settings::default()
        };
        assert_eq!(settings.port(), DEFAULT_BROKER_PORT);
        assert_eq!(settings.scan_interval_seconds(), 0);
        assert_eq!(settings.scan_duration_seconds(), DEFAULT_SCAN_DURATION_SECS);
    }

    #[test]
    fn broker_differs_ignores_scan_fields() {
        let base = Settings {
            broker_host: "broker".to_string(),
            ..Settings::default()
        };
        let rescheduled = Settings {
            scan_interval_seconds: 120.into(),
            ..base.clone()
        };
        assert!(!base.broker_differs(&rescheduled));

        let moved = Settings {
            topic_prefix: "other".to_string(),
            ..base.clone()
        };
        assert!(base.broker_differs(&moved));
    }

    #[test]
    fn take_changed_is_edge_triggered() {
        let (tx, mut watch) = SettingsWatch::new(Settings::default());
        assert!(watch.take_changed().is_none());

        tx.send_replace(Settings {
            broker_host: "broker".to_string(),
            ..Settings::default()
        });
        let changed = watch.take_changed().unwrap();
        assert_eq!(changed.broker_host, "broker");
        assert!(watch.take_changed().is_none());
        assert_eq!(watch.snapshot().broker_host, "broker");
    }
}
