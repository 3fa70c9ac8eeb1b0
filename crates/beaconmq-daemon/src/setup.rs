//! Config loading, default paths, and config file watching.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::DaemonError;
use crate::settings::Settings;

/// Load configuration from the given path, or the default location.
pub fn load_config(path: Option<&str>) -> Result<Config, DaemonError> {
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };

    if config_path.exists() {
        let config = read_config(&config_path)?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        info!("no config file found, using defaults");
        Ok(Config::default())
    }
}

fn read_config(path: &Path) -> Result<Config, DaemonError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DaemonError::Config(format!("failed to read config: {e}")))?;
    toml::from_str(&content).map_err(|e| DaemonError::Config(format!("failed to parse config: {e}")))
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("beaconmq")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Publish a fresh [`Settings`] on `tx` whenever the file at `path` is saved.
///
/// Polls the modification time every `period`. Unreadable or invalid saves
/// are logged and skipped; the previous settings stay in effect. Returns
/// once every receiver has been dropped.
pub async fn watch_config_file(path: PathBuf, tx: watch::Sender<Settings>, period: Duration) {
    let mut last_modified = modified_time(&path);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            debug!("settings receiver gone, stopping config watch");
            return;
        }

        let modified = modified_time(&path);
        if modified == last_modified {
            continue;
        }
        last_modified = modified;
        if modified.is_none() {
            debug!(path = %path.display(), "config file removed, keeping current settings");
            continue;
        }

        match read_config(&path) {
            Ok(config) => {
                info!(path = %path.display(), "config file saved, reloading");
                tx.send_replace(Settings::from(&config));
            }
            Err(e) => warn!(error = %e, "ignoring config change"),
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
