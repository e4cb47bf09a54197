//! Application configuration management.
//!
//! Values are layered: `config/default.toml`, then `config/{RUN_MODE}.toml`,
//! then `TALLY__*` environment variables (`TALLY__DATABASE__URL`,
//! `TALLY__RELAY__BATCH_SIZE`, ...).

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Message broker configuration.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Outbox relay configuration.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Timeout for acquiring a new connection, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    8
}

impl DatabaseConfig {
    /// Connect timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Which broker implementation the relay publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    /// Redis Streams.
    #[default]
    Redis,
    /// Process-local broker, for development only.
    Memory,
}

/// Message broker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Broker implementation.
    #[serde(default)]
    pub kind: BrokerKind,
    /// Broker connection URL.
    #[serde(default = "default_broker_url")]
    pub url: String,
    /// Approximate cap on stream length (`XADD MAXLEN ~`). Unbounded when unset.
    #[serde(default)]
    pub stream_max_len: Option<usize>,
}

fn default_broker_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: BrokerKind::default(),
            url: default_broker_url(),
            stream_max_len: None,
        }
    }
}

/// Outbox relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Maximum number of outbox rows fetched per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Delay between relay passes when the outbox is drained, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delivery attempts per message before giving up on the pass.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff between attempts, in milliseconds. Attempt `n` waits `n * backoff_ms`.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Topic used for aggregate types without an explicit route.
    #[serde(default = "default_topic")]
    pub default_topic: String,
    /// Aggregate type to topic routes. Keys are matched case-insensitively.
    #[serde(default)]
    pub topics: HashMap<String, String>,
}

fn default_batch_size() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_topic() -> String {
    "ledger.entries".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            default_topic: default_topic(),
            topics: HashMap::new(),
        }
    }
}

impl RelayConfig {
    /// Poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Base backoff as a `Duration`.
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_filter() -> String {
    "tally=info,tallyd=info,sea_orm=warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("TALLY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_env_with_defaults() {
        temp_env::with_vars(
            [
                ("RUN_MODE", Some("test-no-such-file")),
                ("TALLY__DATABASE__URL", Some("postgres://localhost/tally")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.database.url, "postgres://localhost/tally");
                assert_eq!(config.database.max_connections, 10);
                assert_eq!(config.broker.kind, BrokerKind::Redis);
                assert_eq!(config.relay.batch_size, 100);
                assert_eq!(config.relay.max_attempts, 5);
                assert_eq!(config.relay.backoff(), Duration::from_millis(500));
                assert_eq!(config.relay.default_topic, "ledger.entries");
                assert_eq!(config.logging.format, LogFormat::Pretty);
            },
        );
    }

    #[test]
    fn test_env_overrides() {
        temp_env::with_vars(
            [
                ("RUN_MODE", Some("test-no-such-file")),
                ("TALLY__DATABASE__URL", Some("postgres://localhost/tally")),
                ("TALLY__BROKER__KIND", Some("memory")),
                ("TALLY__RELAY__BATCH_SIZE", Some("25")),
                ("TALLY__RELAY__POLL_INTERVAL_MS", Some("250")),
                ("TALLY__LOGGING__FORMAT", Some("json")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.broker.kind, BrokerKind::Memory);
                assert_eq!(config.relay.batch_size, 25);
                assert_eq!(config.relay.poll_interval(), Duration::from_millis(250));
                assert_eq!(config.logging.format, LogFormat::Json);
            },
        );
    }

    #[test]
    fn test_missing_database_url_fails() {
        temp_env::with_vars(
            [
                ("RUN_MODE", Some("test-no-such-file")),
                ("TALLY__DATABASE__URL", None::<&str>),
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }
}
