//! evlwatch-agent - Event Log Watch Daemon
//!
//! Runs a watch cycle on a fixed interval and writes the produced text
//! blocks to stdout. The configuration file is re-read before every cycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use parking_lot::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use evlwatch_agent::observability;
use evlwatch_agent::{EventLogWatcher, ReplayPlatform, WatchConfig};

/// Default seconds between cycles
const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Configuration for the daemon
#[derive(Debug, Clone)]
struct Config {
    /// Watch configuration file
    config_path: Option<PathBuf>,
    /// Directory holding the state files
    state_dir: PathBuf,
    /// Replay fixture backing the platform
    replay_path: Option<PathBuf>,
    /// Time between cycles
    interval: Duration,
    /// Address of the client the output is produced for
    remote: Option<String>,
    /// Run a single cycle and exit
    once: bool,
    /// Log level
    log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let dirs = ProjectDirs::from("org", "evlwatch", "evlwatch-agent");

        Self {
            config_path: dirs.as_ref().map(|d| d.config_dir().join("evlwatch.toml")),
            state_dir: dirs
                .as_ref()
                .map(|d| d.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            replay_path: None,
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            remote: None,
            once: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("EVLWATCH_CONFIG") {
            config.config_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("EVLWATCH_STATE_DIR") {
            config.state_dir = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("EVLWATCH_REPLAY") {
            config.replay_path = Some(PathBuf::from(path));
        }

        if let Ok(secs) = std::env::var("EVLWATCH_INTERVAL_SECS") {
            if let Ok(parsed) = secs.parse::<u64>() {
                config.interval = Duration::from_secs(parsed.max(1));
            }
        }

        if let Ok(remote) = std::env::var("EVLWATCH_REMOTE") {
            config.remote = Some(remote).filter(|r| !r.is_empty());
        }

        config.once = std::env::var("EVLWATCH_ONCE").is_ok_and(|v| v != "0");

        if let Ok(level) = std::env::var("EVLWATCH_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }
}

/// Read the watch configuration, falling back to defaults when it is absent
fn load_watch_config(path: Option<&Path>) -> Result<WatchConfig> {
    match path {
        Some(path) if path.exists() => WatchConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        _ => Ok(WatchConfig::default()),
    }
}

fn run_cycle(watcher: &Mutex<EventLogWatcher>, config: &Config) -> Result<String> {
    let watch_config = load_watch_config(config.config_path.as_deref())?;
    let snapshot = watch_config.snapshot();
    Ok(watcher.lock().generate_content(&snapshot, config.remote.as_deref()))
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("EVLWATCH_PRINT_CONFIG").is_ok() {
        print!("{}", WatchConfig::example_toml());
        return Ok(());
    }

    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("evlwatch_agent={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting evlwatch-agent");
    tracing::info!("Platform: {}", std::env::consts::OS);
    tracing::info!("State directory: {}", config.state_dir.display());

    // Validate the configuration once up front
    load_watch_config(config.config_path.as_deref())?;

    let replay = match &config.replay_path {
        Some(path) => ReplayPlatform::from_file(path)?,
        None => {
            tracing::warn!("No replay fixture configured, watching an empty platform");
            ReplayPlatform::new()
        }
    };

    let watcher = Arc::new(Mutex::new(EventLogWatcher::new(
        replay.into_platform(),
        config.state_dir.clone(),
    )));
    let config = Arc::new(config);
    let mut interval = tokio::time::interval(config.interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }

        let cycle = {
            let watcher = watcher.clone();
            let config = config.clone();
            tokio::task::spawn_blocking(move || run_cycle(&watcher, &config))
        };

        match cycle.await.context("Watch cycle panicked")? {
            Ok(text) => print!("{}", text),
            Err(e) => tracing::error!("Watch cycle failed: {:#}", e),
        }
        tracing::debug!(
            "Metrics: {}",
            serde_json::to_string(&observability::metrics().snapshot()).unwrap_or_default()
        );

        if config.once {
            break;
        }
    }

    Ok(())
}
