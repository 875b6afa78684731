//! Server configuration loading and types.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use orderflow_queue::QueueConfig;

use crate::error::{ServerError, ServerResult};

/// Root server configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub event_store: EventStoreConfig,
    #[serde(default)]
    pub queues: QueuesConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Webhook ingress configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Signature timestamp tolerance in seconds.
    #[serde(default = "default_tolerance_secs")]
    pub tolerance_secs: u64,
}

fn default_tolerance_secs() -> u64 {
    300
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: default_tolerance_secs(),
        }
    }
}

/// Event dedupe store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EventStoreConfig {
    /// How long an event id is remembered for deduplication.
    #[serde(default = "default_dedupe_window_secs")]
    pub dedupe_window_secs: u64,
    /// Interval between eviction sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_dedupe_window_secs() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            dedupe_window_secs: default_dedupe_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Per-topic queue configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct QueuesConfig {
    #[serde(default)]
    pub order: TopicConfig,
    #[serde(default)]
    pub email: TopicConfig,
    #[serde(default)]
    pub inventory: TopicConfig,
}

/// Tuning for one topic queue and its worker pool.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicConfig {
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

fn default_retry_ceiling() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    60_000
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

fn default_max_depth() -> usize {
    10_000
}

fn default_concurrency() -> usize {
    2
}

fn default_poll_timeout_ms() -> u64 {
    1_000
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: default_retry_ceiling(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_depth: default_max_depth(),
            concurrency: default_concurrency(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl TopicConfig {
    /// Build the queue tuning from this topic's settings.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::default()
            .with_retry_ceiling(self.retry_ceiling)
            .with_backoff_base(Duration::from_millis(self.backoff_base_ms))
            .with_backoff_cap(Duration::from_millis(self.backoff_cap_ms))
            .with_visibility_timeout(Duration::from_secs(self.visibility_timeout_secs))
            .with_max_depth(self.max_depth)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Secret provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    /// Deployment stage used to namespace secret lookups.
    #[serde(default = "default_stage")]
    pub stage: String,
}

fn default_stage() -> String {
    "dev".to_string()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            stage: default_stage(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ServerError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> ServerResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ServerError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load from `ORDERFLOW_CONFIG` when set, defaults otherwise.
    pub fn load() -> ServerResult<Self> {
        let mut config = match std::env::var("ORDERFLOW_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ORDERFLOW_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ORDERFLOW_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(stage) = std::env::var("ORDERFLOW_STAGE") {
            self.secrets.stage = stage;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    pub fn dedupe_window(&self) -> Duration {
        Duration::from_secs(self.event_store.dedupe_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.event_store.sweep_interval_secs)
    }

    pub fn signature_tolerance(&self) -> Duration {
        Duration::from_secs(self.ingest.tolerance_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.ingest.tolerance_secs, 300);
        assert_eq!(config.queues.order.retry_ceiling, 3);
        assert_eq!(config.queues.email.concurrency, 2);
        assert_eq!(config.secrets.stage, "dev");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_parse_yaml_with_overrides() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090
ingest:
  tolerance_secs: 60
queues:
  order:
    retry_ceiling: 5
    concurrency: 4
event_store:
  dedupe_window_secs: 3600
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.ingest.tolerance_secs, 60);
        assert_eq!(config.queues.order.retry_ceiling, 5);
        assert_eq!(config.queues.order.concurrency, 4);
        // Unspecified topics keep defaults.
        assert_eq!(config.queues.email.retry_ceiling, 3);
        assert_eq!(config.event_store.dedupe_window_secs, 3600);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = Config::from_yaml("server: [not, a, map]");
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("ORDERFLOW_HOST", "10.0.0.5");
        std::env::set_var("ORDERFLOW_PORT", "9999");
        std::env::set_var("ORDERFLOW_STAGE", "prod");
        std::env::set_var("RUST_LOG", "orderflow=debug");

        let mut config = Config::default();
        config.apply_env_overrides();

        std::env::remove_var("ORDERFLOW_HOST");
        std::env::remove_var("ORDERFLOW_PORT");
        std::env::remove_var("ORDERFLOW_STAGE");
        std::env::remove_var("RUST_LOG");

        assert_eq!(config.server.host, "10.0.0.5");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.secrets.stage, "prod");
        assert_eq!(config.logging.level, "orderflow=debug");

        // An unparsable port is ignored rather than clobbering the value.
        std::env::set_var("ORDERFLOW_PORT", "not-a-port");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("ORDERFLOW_PORT");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_queue_config_mapping() {
        let topic = TopicConfig {
            retry_ceiling: 2,
            backoff_base_ms: 500,
            backoff_cap_ms: 4_000,
            visibility_timeout_secs: 10,
            max_depth: 100,
            concurrency: 1,
            poll_timeout_ms: 250,
        };
        let queue = topic.queue_config();
        assert_eq!(queue.retry_ceiling, 2);
        assert_eq!(queue.backoff_base, Duration::from_millis(500));
        assert_eq!(queue.max_depth, 100);
        assert_eq!(topic.poll_timeout(), Duration::from_millis(250));
    }
}
