//! Watcher configuration
//!
//! Values come from built-in defaults, optionally overridden by a TOML file,
//! and finally by environment variables using the deployment's variable names.

use crate::classifiers::KnownAddresses;
use crate::error::ConfigError;
use crate::events::PoolIdentity;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the proxy access log
pub const DEFAULT_LOG_FILE: &str = "/var/log/nginx/access.log";

/// Runtime configuration for the pool watcher
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Slack incoming webhook; alerts are only logged when unset
    pub webhook_url: Option<String>,
    /// Pool expected to be live at startup
    pub active_pool: PoolIdentity,
    /// Error-rate alert threshold in percent
    pub error_rate_threshold: f64,
    /// Number of recent requests in the sliding window
    pub window_size: usize,
    /// Minimum time between two alerts of the same detector
    pub alert_cooldown_secs: u64,
    /// Suppress all alerts except critical ones
    pub maintenance_mode: bool,
    /// Addresses known to belong to the blue pool
    pub blue_addresses: Vec<String>,
    /// Addresses known to belong to the green pool
    pub green_addresses: Vec<String>,
    /// Access log to follow
    pub log_file: PathBuf,
    /// Requests required in the window before the error rate is evaluated
    pub min_samples: usize,
    /// Upper bound for one webhook delivery
    pub notify_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webhook_url: None,
            active_pool: PoolIdentity::Blue,
            error_rate_threshold: 2.0,
            window_size: 200,
            alert_cooldown_secs: 300,
            maintenance_mode: false,
            blue_addresses: Vec::new(),
            green_addresses: Vec::new(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            min_samples: 20,
            notify_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// `ConfigError::ReadError` if the file cannot be read, `TomlError` if it is
    /// not valid TOML for this schema, `ValidationError` if values are out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Override fields using `lookup` as the environment
    ///
    /// Recognized keys: `SLACK_WEBHOOK_URL`, `ACTIVE_POOL`, `ERROR_RATE_THRESHOLD`,
    /// `WINDOW_SIZE`, `ALERT_COOLDOWN_SEC`, `MAINTENANCE_MODE`, `BLUE_IPS`,
    /// `GREEN_IPS`, `LOG_FILE`, `MIN_SAMPLES`, `NOTIFY_TIMEOUT_SEC`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SLACK_WEBHOOK_URL") {
            let url = url.trim().to_string();
            self.webhook_url = (!url.is_empty()).then_some(url);
        }
        if let Some(pool) = lookup("ACTIVE_POOL") {
            self.active_pool = pool
                .parse()
                .map_err(|e| ConfigError::ValidationError(format!("ACTIVE_POOL: {}", e)))?;
        }
        if let Some(value) = lookup("ERROR_RATE_THRESHOLD") {
            self.error_rate_threshold = parse_env("ERROR_RATE_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("WINDOW_SIZE") {
            self.window_size = parse_env("WINDOW_SIZE", &value)?;
        }
        if let Some(value) = lookup("ALERT_COOLDOWN_SEC") {
            self.alert_cooldown_secs = parse_env("ALERT_COOLDOWN_SEC", &value)?;
        }
        if let Some(value) = lookup("MAINTENANCE_MODE") {
            self.maintenance_mode = value.trim().eq_ignore_ascii_case("true");
        }
        if let Some(value) = lookup("BLUE_IPS") {
            self.blue_addresses = split_csv(&value);
        }
        if let Some(value) = lookup("GREEN_IPS") {
            self.green_addresses = split_csv(&value);
        }
        if let Some(value) = lookup("LOG_FILE").filter(|v| !v.trim().is_empty()) {
            self.log_file = PathBuf::from(value.trim());
        }
        if let Some(value) = lookup("MIN_SAMPLES") {
            self.min_samples = parse_env("MIN_SAMPLES", &value)?;
        }
        if let Some(value) = lookup("NOTIFY_TIMEOUT_SEC") {
            self.notify_timeout_secs = parse_env("NOTIFY_TIMEOUT_SEC", &value)?;
        }
        self.validate()
    }

    /// Check that values are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.active_pool.is_known() {
            return Err(ConfigError::ValidationError(
                "active_pool must be 'blue' or 'green'".to_string(),
            ));
        }
        if !self.error_rate_threshold.is_finite() || self.error_rate_threshold < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "error_rate_threshold must be a non-negative number, got {}",
                self.error_rate_threshold
            )));
        }
        if self.window_size == 0 {
            return Err(ConfigError::ValidationError(
                "window_size must be greater than 0".to_string(),
            ));
        }
        if self.min_samples == 0 {
            return Err(ConfigError::ValidationError(
                "min_samples must be greater than 0".to_string(),
            ));
        }
        if self.notify_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "notify_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn known_addresses(&self) -> KnownAddresses {
        KnownAddresses::new(&self.blue_addresses, &self.green_addresses)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("{}='{}': {}", key, value, e)))
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.active_pool, PoolIdentity::Blue);
        assert_eq!(config.error_rate_threshold, 2.0);
        assert_eq!(config.window_size, 200);
        assert_eq!(config.alert_cooldown_secs, 300);
        assert!(!config.maintenance_mode);
        assert_eq!(config.webhook_url, None);
        assert_eq!(config.min_samples, 20);
        assert_eq!(config.notify_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[
                ("SLACK_WEBHOOK_URL", "https://hooks.slack.com/services/T/B/X"),
                ("ACTIVE_POOL", "Green"),
                ("ERROR_RATE_THRESHOLD", "5.5"),
                ("WINDOW_SIZE", "50"),
                ("ALERT_COOLDOWN_SEC", "60"),
                ("MAINTENANCE_MODE", "TRUE"),
                ("BLUE_IPS", "172.18.0.2, 172.18.0.4,"),
                ("GREEN_IPS", ""),
                ("LOG_FILE", "/tmp/access.log"),
            ]))
            .unwrap();

        assert_eq!(
            config.webhook_url.as_deref(),
            Some("https://hooks.slack.com/services/T/B/X")
        );
        assert_eq!(config.active_pool, PoolIdentity::Green);
        assert_eq!(config.error_rate_threshold, 5.5);
        assert_eq!(config.window_size, 50);
        assert_eq!(config.alert_cooldown_secs, 60);
        assert!(config.maintenance_mode);
        assert_eq!(config.blue_addresses, vec!["172.18.0.2", "172.18.0.4"]);
        assert!(config.green_addresses.is_empty());
        assert_eq!(config.log_file, PathBuf::from("/tmp/access.log"));
    }

    #[test]
    fn test_maintenance_mode_only_for_true() {
        for value in ["1", "yes", "false", ""] {
            let mut config = Config::default();
            config
                .apply_env_with(env(&[("MAINTENANCE_MODE", value)]))
                .unwrap();
            assert!(!config.maintenance_mode, "value: {}", value);
        }
    }

    #[test]
    fn test_empty_webhook_is_unset() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[("SLACK_WEBHOOK_URL", "  ")]))
            .unwrap();
        assert_eq!(config.webhook_url, None);
    }

    #[test]
    fn test_invalid_env_values() {
        let cases = [
            ("ACTIVE_POOL", "purple"),
            ("ERROR_RATE_THRESHOLD", "lots"),
            ("WINDOW_SIZE", "-1"),
            ("WINDOW_SIZE", "0"),
            ("ALERT_COOLDOWN_SEC", "soon"),
            ("MIN_SAMPLES", "0"),
            ("NOTIFY_TIMEOUT_SEC", "0"),
        ];
        for (key, value) in cases {
            let mut config = Config::default();
            let result = config.apply_env_with(env(&[(key, value)]));
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
active_pool = "green"
error_rate_threshold = 10.0
window_size = 100
green_addresses = ["10.0.0.3"]
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.active_pool, PoolIdentity::Green);
        assert_eq!(config.error_rate_threshold, 10.0);
        assert_eq!(config.window_size, 100);
        assert_eq!(config.green_addresses, vec!["10.0.0.3"]);
        // unspecified keys keep their defaults
        assert_eq!(config.alert_cooldown_secs, 300);
    }

    #[test]
    fn test_env_beats_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "window_size = 100\nalert_cooldown_secs = 30").unwrap();

        let mut config = Config::from_file(file.path()).unwrap();
        config
            .apply_env_with(env(&[("WINDOW_SIZE", "400")]))
            .unwrap();

        assert_eq!(config.window_size, 400);
        assert_eq!(config.alert_cooldown_secs, 30);
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/poolwatch.toml")),
            Err(ConfigError::ReadError(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "window_size = \"big\"").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::TomlError(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "active_pool = \"unknown\"").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_known_addresses() {
        let config = Config {
            blue_addresses: vec![" 10.0.0.2 ".to_string()],
            green_addresses: vec!["10.0.0.3".to_string()],
            ..Config::default()
        };
        let known = config.known_addresses();
        assert_eq!(known.blue, vec!["10.0.0.2"]);
        assert_eq!(known.green, vec!["10.0.0.3"]);
    }
}
