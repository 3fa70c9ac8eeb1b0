//! beaconmq CLI: runs the scan-and-publish daemon and its helper commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use beaconmq_daemon::{setup, Config, Daemon, DaemonEvent, Settings, SettingsWatch};
use beaconmq_protocol::{MqttTransport, MAX_MESSAGE_SIZE};
use beaconmq_scanner::{ReplayScanner, ScanDriver};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// How often the config file is checked for saves.
const CONFIG_POLL_PERIOD: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(
    name = "beaconmq",
    about = "Scan for BLE advertisements and publish them to an MQTT broker",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon.
    Run {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,

        /// Report advertisements from a JSON recording instead of a radio.
        #[arg(short, long)]
        replay: Option<PathBuf>,
    },

    /// Print the default configuration.
    DefaultConfig,

    /// Print the payload one scan of a recording would publish.
    Encode {
        /// JSON recording to scan.
        #[arg(short, long)]
        replay: PathBuf,

        /// Payload size limit in bytes.
        #[arg(long, default_value_t = MAX_MESSAGE_SIZE)]
        max_bytes: usize,
    },
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, replay } => {
            let loaded = setup::load_config(config.as_deref())?;
            init_tracing(&loaded.daemon.log_level);
            let config_path = config.map_or_else(setup::default_config_path, PathBuf::from);

            tracing::info!(path = %config_path.display(), "starting beaconmq daemon");
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_daemon(loaded, config_path, replay.as_deref()))?;
        }
        Commands::DefaultConfig => {
            print!("{}", toml::to_string_pretty(&Config::default())?);
        }
        Commands::Encode { replay, max_bytes } => {
            init_tracing("warn");
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let payload = runtime.block_on(encode_recording(&replay, max_bytes))?;
            println!("{}", String::from_utf8_lossy(&payload));
        }
    }

    Ok(())
}

async fn run_daemon(config: Config, config_path: PathBuf, replay: Option<&Path>) -> anyhow::Result<()> {
    let scanner = if let Some(path) = replay {
        ReplayScanner::from_path(path)?
    } else {
        tracing::warn!("no radio backend on this host, scans will report nothing");
        ReplayScanner::from_records(Vec::new())
    };

    let (settings_tx, settings_watch) = SettingsWatch::new(Settings::from(&config));
    let watcher = tokio::spawn(setup::watch_config_file(
        config_path,
        settings_tx,
        CONFIG_POLL_PERIOD,
    ));

    let mut daemon = Daemon::new(
        &config.daemon,
        settings_watch,
        Box::new(MqttTransport::new()),
        Box::new(scanner),
    );

    let events = daemon.event_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            let _ = events.send(DaemonEvent::Shutdown).await;
        }
    });

    daemon.run().await?;
    watcher.abort();
    Ok(())
}

async fn encode_recording(path: &Path, max_bytes: usize) -> anyhow::Result<Vec<u8>> {
    let mut scanner = ReplayScanner::from_path(path)?;
    let mut records = Vec::new();
    scanner.start_scan(Duration::ZERO, &mut records).await?;
    scanner.clear_results();
    Ok(beaconmq_protocol::encode(&records, max_bytes)?)
}
