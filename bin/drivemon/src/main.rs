//! Drivemon - SMART telemetry exporter
//!
//! Discovers the host's block devices once at startup and serves their
//! health registers as scrape-ready metrics.

mod server;

use anyhow::Result;
use clap::Parser;
use drivemon_exporter::Collector;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "drivemon")]
#[command(about = "SMART telemetry exporter")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/drivemon/drivemon.toml")]
    config: String,

    /// Listen address: host:port, or an absolute unix-socket path with
    /// an optional ",mode" octal suffix
    #[arg(short, long)]
    listen: Option<String>,

    /// HTTP path the metrics are served under
    #[arg(short, long)]
    metrics_path: Option<String>,

    /// Block devices to skip at discovery (repeatable)
    #[arg(long = "skip")]
    skip: Vec<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct Config {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    devices: DeviceConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_listen")]
    listen: String,
    #[serde(default = "default_metrics_path")]
    metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            metrics_path: default_metrics_path(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct DeviceConfig {
    #[serde(default)]
    skip: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LoggingConfig {
    #[serde(default = "default_log_level")]
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8188".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config file if it exists
    let config: Config = if std::path::Path::new(&args.config).exists() {
        let config_str = std::fs::read_to_string(&args.config)?;
        toml::from_str(&config_str).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to parse config file: {}", e);
            Config::default()
        })
    } else {
        Config::default()
    };

    // Merge CLI args with config file (CLI takes precedence)
    let listen = args.listen.unwrap_or(config.server.listen);
    let metrics_path = args.metrics_path.unwrap_or(config.server.metrics_path);
    let skip = if args.skip.is_empty() {
        config.devices.skip
    } else {
        args.skip
    };
    let log_level = if args.log_level != "info" {
        args.log_level
    } else {
        config.logging.level
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting drivemon");
    if !skip.is_empty() {
        info!("Skipping devices: {:?}", skip);
    }

    // Devices are discovered once; they are not re-discovered mid-run.
    let devices = drivemon_device::discover(&skip);
    let mut collector = Collector::from_devices(devices);
    if collector.device_count() == 0 {
        warn!("no SMART-capable devices found, serving an empty metric set");
    }

    // Describe phase runs up front; collect runs once per scrape.
    let described = collector.describe();
    info!(
        "Exporting {} metric families from {} devices",
        described.len(),
        collector.device_count()
    );

    server::serve(&listen, &metrics_path, collector).await
}
