//! # VLM Bridge
//!
//! Republish a Virtual Loup de Mer boat, its wind and its fleet as a
//! Signal K delta stream.
//!
//! Deltas are written to stdout as JSON lines, the input format of a
//! Signal K server execute provider. Deltas read from stdin carry waypoint
//! changes made on the boat's own bus.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vlm_bridge::config::{Config, LoggingConfig};
use vlm_bridge::engine::{Schedule, Scheduler};
use vlm_bridge::telemetry::delta::{waypoint_notifications, Delta, WaypointNotification};
use vlm_bridge::telemetry::sink::{LineSink, RotatingJsonlSink, TelemetrySink};
use vlm_bridge::vlm::VlmClient;

/// Configuration file used when none is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable naming the configuration file
const CONFIG_PATH_ENV: &str = "VLM_BRIDGE_CONFIG";

/// Prefix of the daily log files
const LOG_FILE_PREFIX: &str = "vlm-bridge.log";

/// Capacity of the waypoint notification channel
const WAYPOINT_CHANNEL_CAPACITY: usize = 8;

/// Main entry point for VLM Bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration from the first argument, `VLM_BRIDGE_CONFIG` or
///      `config/default.toml`
///    - Set up logging to stderr, and to a daily file when configured
///    - Build the race service client and the delta sinks
///
/// 2. **Main Loop**
///    - Poll the race service and publish deltas on the configured schedule
///    - Forward waypoint changes read from stdin when waypoint setting is on
///
/// 3. **Graceful Shutdown**
///    - Stop on Ctrl+C
///    - Flush the sinks and log run counters
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded, the HTTP client
/// cannot be built or the record directory cannot be created.
#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path(std::env::args().nth(1), std::env::var(CONFIG_PATH_ENV).ok());
    let config = Config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))?;

    let _log_guards = init_logging(&config.logging);

    info!("VLM Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", path.display());

    let client = VlmClient::new(&config.account, &config.service).context("Failed to build race service client")?;
    info!("Polling boat {} at {}", client.boat_id(), config.service.base_url);

    let mut sinks: Vec<Box<dyn TelemetrySink>> = vec![Box::new(LineSink::stdout())];
    if config.output.record_enabled {
        let recorder = RotatingJsonlSink::new(
            &config.output.record_dir,
            config.output.max_records_per_file,
            config.output.max_files_to_keep,
        )
        .with_context(|| format!("Failed to open record directory {}", config.output.record_dir))?;
        sinks.push(Box::new(recorder));
    }

    let schedule = Schedule::from_config(&config.schedule, &config.fleet, config.account.set_waypoint);
    let mut scheduler = Scheduler::new(Arc::new(client), sinks, schedule);

    if config.account.set_waypoint {
        let (tx, rx) = mpsc::channel(WAYPOINT_CHANNEL_CAPACITY);
        tokio::spawn(read_waypoint_notifications(tx));
        scheduler = scheduler.with_waypoint_notifications(rx);
        info!("Waypoint setting enabled, listening on stdin");
    }

    info!("Press Ctrl+C to exit");

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => warn!("Failed to listen for Ctrl+C, shutting down: {}", e),
        }
    };

    let (state, _stats) = scheduler.run(shutdown).await;
    info!(
        "VLM Bridge stopped, {} competitors tracked",
        state.fleet().len()
    );

    Ok(())
}

/// Resolve the configuration file path
fn config_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` overrides the configured level. The returned guards flush the
/// non-blocking writers when dropped and must live until exit.
fn init_logging(config: &LoggingConfig) -> Vec<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // stdout carries the delta stream
    let (stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let mut guards = vec![stderr_guard];

    let file_layer = if config.dir.is_empty() {
        None
    } else {
        let appender = tracing_appender::rolling::daily(&config.dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        Some(fmt::layer().with_writer(writer).with_ansi(false))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(stderr))
        .with(file_layer)
        .init();

    guards
}

/// Waypoint notifications carried by one line of inbound deltas
fn parse_inbound_line(line: &str) -> serde_json::Result<Vec<WaypointNotification>> {
    let delta: Delta = serde_json::from_str(line)?;
    Ok(waypoint_notifications(&delta))
}

/// Forward waypoint changes read from stdin until it closes
async fn read_waypoint_notifications(tx: mpsc::Sender<WaypointNotification>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_inbound_line(line) {
                    Ok(notifications) => {
                        for notification in notifications {
                            if tx.send(notification).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => debug!("Ignoring unreadable inbound delta: {}", e),
                }
            }
            Ok(None) => {
                info!("Inbound delta stream closed");
                return;
            }
            Err(e) => {
                warn!("Failed to read inbound deltas: {}", e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vlm_bridge::nav::geo::Position;

    #[test]
    fn test_config_path_precedence() {
        assert_eq!(
            config_path(Some("boat.toml".to_string()), Some("env.toml".to_string())),
            PathBuf::from("boat.toml")
        );
        assert_eq!(config_path(None, Some("env.toml".to_string())), PathBuf::from("env.toml"));
        assert_eq!(config_path(None, None), PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(config_path(Some(String::new()), None), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::load(DEFAULT_CONFIG_PATH).unwrap();
        assert!(!config.account.set_waypoint);
        assert!(config.fleet.enabled);
    }

    #[test]
    fn test_parse_inbound_waypoint() {
        let line = r#"{"updates":[{"$source":"plotter","values":[
            {"path":"navigation.courseRhumbline.nextPoint.position",
             "value":{"latitude":46.123456789,"longitude":-2.5}}]}]}"#;
        let notes = parse_inbound_line(line).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].position, Position::new(46.1234568, -2.5));
    }

    #[test]
    fn test_parse_inbound_garbage() {
        assert!(parse_inbound_line("not json").is_err());
        assert!(parse_inbound_line(r#"{"updates":[]}"#).unwrap().is_empty());
    }
}
