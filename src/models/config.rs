//! Application configuration structures.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP probing and scheduling behavior
    #[serde(default)]
    pub prober: ProberConfig,

    /// Durable store connection settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Message bus topic and delivery settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration if the file exists, otherwise use defaults.
    ///
    /// Only a missing file falls back; unreadable or malformed files are errors.
    pub fn load_if_present(path: impl AsRef<Path>) -> Result<(Self, ConfigOrigin)> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => Ok((config, ConfigOrigin::File(path.to_path_buf()))),
            Err(AppError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Ok((Self::default(), ConfigOrigin::Defaults))
            }
            Err(e) => Err(e),
        }
    }

    /// Apply overrides from the process environment.
    ///
    /// `DATABASE_URL` replaces `database.url` when set.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database.url = url;
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.prober.user_agent.trim().is_empty() {
            return Err(AppError::validation("prober.user_agent is empty"));
        }
        if self.prober.timeout_secs == 0 {
            return Err(AppError::validation("prober.timeout_secs must be > 0"));
        }
        if self.prober.max_concurrent == 0 {
            return Err(AppError::validation("prober.max_concurrent must be > 0"));
        }
        if self.database.url.trim().is_empty() {
            return Err(AppError::validation("database.url is empty"));
        }
        if self.database.max_connections == 0 {
            return Err(AppError::validation(
                "database.max_connections must be > 0",
            ));
        }
        if self.bus.topic.trim().is_empty() {
            return Err(AppError::validation("bus.topic is empty"));
        }
        if self.bus.batch_size == 0 {
            return Err(AppError::validation("bus.batch_size must be > 0"));
        }
        if self.bus.claim_lease_secs == 0 {
            return Err(AppError::validation("bus.claim_lease_secs must be > 0"));
        }
        Ok(())
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// No file was found; every value is a default
    Defaults,
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::File(path) => write!(f, "{}", path.display()),
            ConfigOrigin::Defaults => f.write_str("built-in defaults"),
        }
    }
}

/// What a cycle does when the config snapshot cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigErrorPolicy {
    /// Surface the error and stop the scheduler
    #[default]
    Abort,
    /// Log the error, skip the cycle and try again after the interval
    Skip,
}

/// HTTP probing and scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProberConfig {
    /// User-Agent header for probe requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum probes in flight at once (worker pool size)
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Sleep between the end of one cycle and the start of the next
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Follow redirects; when false a 3xx is reported as-is
    #[serde(default = "defaults::follow_redirects")]
    pub follow_redirects: bool,

    /// Behavior when the site snapshot cannot be loaded
    #[serde(default)]
    pub on_config_error: ConfigErrorPolicy,
}

impl ProberConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            interval_secs: defaults::interval(),
            follow_redirects: defaults::follow_redirects(),
            on_config_error: ConfigErrorPolicy::default(),
        }
    }
}

/// Postgres connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL, overridden by `DATABASE_URL`
    #[serde(default = "defaults::database_url")]
    pub url: String,

    /// Pool size
    #[serde(default = "defaults::max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::database_url(),
            max_connections: defaults::max_connections(),
        }
    }
}

/// Message bus settings shared by publisher and consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Topic carrying probe outcomes
    #[serde(default = "defaults::topic")]
    pub topic: String,

    /// Extra publish attempts after the first one fails (0 = at-most-once)
    #[serde(default)]
    pub publish_retries: u32,

    /// Initial backoff between publish attempts, doubled each retry
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Messages claimed per poll by the consumer
    #[serde(default = "defaults::batch_size")]
    pub batch_size: u32,

    /// Idle wait between polls when the topic is empty
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_ms: u64,

    /// Claimed-but-unacknowledged messages become visible again after this
    #[serde(default = "defaults::claim_lease")]
    pub claim_lease_secs: u64,
}

impl BusConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            topic: defaults::topic(),
            publish_retries: 0,
            retry_backoff_ms: defaults::retry_backoff(),
            batch_size: defaults::batch_size(),
            poll_interval_ms: defaults::poll_interval(),
            claim_lease_secs: defaults::claim_lease(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Prober defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; site-prober/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        16
    }
    pub fn interval() -> u64 {
        30
    }
    pub fn follow_redirects() -> bool {
        true
    }

    // Database defaults
    pub fn database_url() -> String {
        "postgres://localhost/site_prober".into()
    }
    pub fn max_connections() -> u32 {
        5
    }

    // Bus defaults
    pub fn topic() -> String {
        "probe-results".into()
    }
    pub fn retry_backoff() -> u64 {
        100
    }
    pub fn batch_size() -> u32 {
        32
    }
    pub fn poll_interval() -> u64 {
        500
    }
    pub fn claim_lease() -> u64 {
        60
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
