use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use log::{error, info, warn};
use poolwatch::alerts::{LogNotifier, Notifier, SlackNotifier};
use poolwatch::collectors::TailCollector;
use poolwatch::config::Config;
use poolwatch::error::ConfigError;
use poolwatch::Watcher;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Command-line arguments for the pool watcher
#[derive(Parser)]
#[command(
    name = "poolwatch",
    about = "Blue/green pool watcher - failover and error-rate alerts from proxy access logs",
    long_about = "Follows a reverse proxy's JSON access log, detects when traffic moves between \
                  the blue and green pools and when the upstream error rate climbs, and posts \
                  alerts to a Slack webhook."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Access log to follow, overrides config and LOG_FILE
    #[arg(short, long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults later, directories never make sense
            if config_path.exists() && config_path.is_dir() {
                return Err(format!(
                    "Configuration path is a directory, not a file: {}",
                    config_path.display()
                ));
            }
        }
        if let Some(ref log_file) = self.log_file {
            if log_file.as_os_str().is_empty() {
                return Err("Log file path must not be empty".to_string());
            }
        }
        Ok(())
    }

    /// Convert config path to string safely, handling non-UTF-8 paths
    fn config_path_str(&self) -> Result<Option<&str>, String> {
        match &self.config {
            Some(path) => match path.to_str() {
                Some(path_str) => Ok(Some(path_str)),
                None => Err(format!(
                    "Configuration file path contains invalid UTF-8 characters: {}",
                    path.display()
                )),
            },
            None => Ok(None),
        }
    }
}

/// Load configuration: defaults, then the optional TOML file, then the environment
///
/// A missing or unreadable file only produces a warning. A file that exists but
/// is invalid, or an environment value that does not parse, is an error.
fn load_config(config_path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            match Config::from_file(Path::new(path)) {
                Ok(config) => config,
                Err(ConfigError::ReadError(e)) => {
                    warn!("Configuration file not found or unreadable ({}), using defaults", e);
                    Config::default()
                }
                Err(e) => return Err(e),
            }
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    config.apply_env()?;
    Ok(config)
}

fn log_effective_config(config: &Config) {
    info!("Configuration:");
    info!("  Log file: {}", config.log_file.display());
    info!("  Active pool: {}", config.active_pool);
    info!("  Error rate threshold: {}%", config.error_rate_threshold);
    info!("  Window size: {} requests", config.window_size);
    info!("  Minimum samples: {}", config.min_samples);
    info!("  Alert cooldown: {}s", config.alert_cooldown_secs);
    info!("  Maintenance mode: {}", config.maintenance_mode);
    info!(
        "  Slack webhook: {}",
        if config.webhook_url.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    if !config.blue_addresses.is_empty() || !config.green_addresses.is_empty() {
        info!(
            "  Known addresses: blue={:?} green={:?}",
            config.blue_addresses, config.green_addresses
        );
    }
}

fn build_notifier(config: &Config) -> anyhow::Result<Box<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) => {
            let notifier = SlackNotifier::new(url.clone(), config.notify_timeout())
                .context("Failed to initialize Slack notifier")?;
            Ok(Box::new(notifier))
        }
        None => {
            warn!("SLACK_WEBHOOK_URL not set, alerts will only be logged");
            Ok(Box::new(LogNotifier))
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config_path_str()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration path")?;

    let mut config = load_config(config_path).context("Failed to load configuration")?;
    if let Some(ref log_file) = cli.log_file {
        config.log_file = log_file.clone();
    }
    log_effective_config(&config);

    let notifier = build_notifier(&config)?;
    let mut watcher = Watcher::new(&config, notifier);
    watcher.announce_startup(Utc::now());

    let (line_sender, line_receiver) = mpsc::channel();
    let (shutdown_sender, shutdown_receiver) = mpsc::channel();

    let mut collector = TailCollector::new(config.log_file.clone(), line_sender);
    collector
        .start()
        .with_context(|| format!("Failed to follow {}", config.log_file.display()))?;

    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down gracefully...");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("Failed to install interrupt handler")?;

    info!("Watching {}. Press Ctrl+C to stop.", config.log_file.display());

    let result = watcher.run(&line_receiver, &shutdown_receiver);

    if let Err(e) = collector.stop() {
        error!("Failed to stop log collector: {}", e);
    }

    let stats = watcher.stats();
    info!(
        "Processed {} requests ({} errors, {} dropped lines, {} alerts)",
        stats.processed, stats.errors, stats.dropped, stats.alerts
    );

    if let Err(ref e) = result {
        error!("Watcher stopped: {}", e);
        watcher.announce_fatal(e, Utc::now());
    }
    result.context("Log ingestion failed")
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    } else if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    info!("Starting pool watcher");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Pool watcher shutdown complete");
}
