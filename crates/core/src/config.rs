use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `ADSERVE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    /// Priority assumed for a candidate that has no assignment for the
    /// requested slot (it was pulled in through a placement configuration).
    #[serde(default = "default_priority")]
    pub default_priority: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_clickhouse_db")]
    pub database: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

// Default functions
fn default_node_id() -> String {
    "adserve-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_priority() -> u8 {
    5
}
fn default_retention_days() -> u32 {
    90
}
fn default_purge_interval_secs() -> u64 {
    3600
}
fn default_queue_capacity() -> usize {
    100_000
}
fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}
fn default_clickhouse_db() -> String {
    "adserve".to_string()
}
fn default_batch_size() -> usize {
    10000
}
fn default_flush_interval_ms() -> u64 {
    1000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            default_priority: default_priority(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            purge_interval_secs: default_purge_interval_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_clickhouse_url(),
            database: default_clickhouse_db(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            selection: SelectionConfig::default(),
            events: EventsConfig::default(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("ADSERVE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Check cross-field constraints serde defaults cannot express.
    pub fn validate(&self) -> Result<(), crate::EngineError> {
        if !(1..=10).contains(&self.selection.default_priority) {
            return Err(crate::EngineError::Config(format!(
                "selection.default_priority must be within 1..=10, got {}",
                self.selection.default_priority
            )));
        }
        if self.events.retention_days == 0 {
            return Err(crate::EngineError::Config(
                "events.retention_days must be at least 1".to_string(),
            ));
        }
        if self.events.queue_capacity == 0 {
            return Err(crate::EngineError::Config(
                "events.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.clickhouse.enabled {
            if self.clickhouse.flush_interval_ms == 0 {
                return Err(crate::EngineError::Config(
                    "clickhouse.flush_interval_ms must be at least 1".to_string(),
                ));
            }
            if self.clickhouse.batch_size == 0 {
                return Err(crate::EngineError::Config(
                    "clickhouse.batch_size must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.events.retention_days, 90);
        assert_eq!(config.selection.default_priority, 5);
        assert!(!config.clickhouse.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_priority() {
        let mut config = AppConfig::default();
        config.selection.default_priority = 0;
        assert!(config.validate().is_err());
        config.selection.default_priority = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let mut config = AppConfig::default();
        config.events.retention_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_flush_interval_when_exporting() {
        let mut config = AppConfig::default();
        config.clickhouse.flush_interval_ms = 0;
        assert!(config.validate().is_ok());

        config.clickhouse.enabled = true;
        assert!(config.validate().is_err());

        config.clickhouse.flush_interval_ms = 1000;
        config.clickhouse.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
