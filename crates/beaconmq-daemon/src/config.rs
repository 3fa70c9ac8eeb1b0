//! Daemon configuration loaded from TOML.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// A numeric setting given either as a TOML integer or as a string.
///
/// Parsed on use; each setting has its own fallback for unparsable values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericField {
    Integer(i64),
    Text(String),
}

impl NumericField {
    /// The value as a non-negative integer, if it is one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(n) => u64::try_from(*n).ok(),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl From<i64> for NumericField {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<&str> for NumericField {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Message broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: NumericField,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub topic_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            topic_prefix: String::new(),
        }
    }
}

/// Scan timing. An interval of 0 disables recurring scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_interval")]
    pub interval_seconds: NumericField,
    #[serde(default = "default_duration")]
    pub duration_seconds: NumericField,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
            duration_seconds: default_duration(),
        }
    }
}

/// Process runtime settings. Read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Control loop period in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tick_ms: default_tick_ms(),
            keep_alive_seconds: default_keep_alive(),
        }
    }
}

fn default_port() -> NumericField {
    NumericField::Integer(1883)
}

fn default_interval() -> NumericField {
    NumericField::Integer(15)
}

fn default_duration() -> NumericField {
    NumericField::Integer(5)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_ms() -> u64 {
    100
}

fn default_keep_alive() -> u64 {
    15
}
