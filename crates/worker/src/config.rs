use domain::services::PrecisionPolicy;
use persistence::db::PoolConfig;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub sync: SyncConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Which document store backs the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store, lost on restart.
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl StoreConfig {
    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Tuning of the sync core.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Quiet period before group locations are fetched again.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Reports less precise than this many meters are rejected.
    #[serde(default = "default_max_accuracy")]
    pub max_accuracy_meters: f64,

    /// Reports less precise than this are stored with a warning.
    #[serde(default = "default_warning_accuracy")]
    pub warning_accuracy_meters: f64,

    /// Online locations older than this are flagged offline.
    #[serde(default = "default_inactive_minutes")]
    pub inactive_after_minutes: i64,
}

impl SyncConfig {
    pub fn precision(&self) -> PrecisionPolicy {
        PrecisionPolicy::new(self.max_accuracy_meters, self.warning_accuracy_meters)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn inactive_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.inactive_after_minutes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_jobs_enabled")]
    pub enabled: bool,

    #[serde(default = "default_backfill_interval")]
    pub backfill_interval_minutes: u64,

    #[serde(default = "default_location_interval")]
    pub location_interval_minutes: u64,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_backend() -> StoreBackend {
    StoreBackend::Memory
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_debounce_ms() -> u64 {
    300
}
fn default_max_accuracy() -> f64 {
    50.0
}
fn default_warning_accuracy() -> f64 {
    30.0
}
fn default_inactive_minutes() -> i64 {
    30
}
fn default_jobs_enabled() -> bool {
    true
}
fn default_backfill_interval() -> u64 {
    60
}
fn default_location_interval() -> u64 {
    15
}
fn default_shutdown_timeout() -> u64 {
    10
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml
    /// 2. config/local.toml (optional, not in git)
    /// 3. Environment variables with CIRCLES__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("CIRCLES").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Builds a configuration from embedded defaults plus overrides, without
    /// touching the file system.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30

            [store]
            backend = "memory"
            url = ""

            [logging]
            level = "info"
            format = "json"

            [sync]
            debounce_ms = 300
            max_accuracy_meters = 50.0
            warning_accuracy_meters = 30.0
            inactive_after_minutes = 30

            [jobs]
            enabled = false
            backfill_interval_minutes = 60
            location_interval_minutes = 15
            shutdown_timeout_secs = 10
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.store.backend == StoreBackend::Postgres && self.store.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "CIRCLES__STORE__URL must be set for the postgres backend".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.store.min_connections > self.store.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        let sync = &self.sync;
        if sync.max_accuracy_meters <= 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "max_accuracy_meters must be positive".to_string(),
            ));
        }
        if sync.warning_accuracy_meters > sync.max_accuracy_meters {
            return Err(ConfigValidationError::InvalidValue(
                "warning_accuracy_meters cannot exceed max_accuracy_meters".to_string(),
            ));
        }
        if sync.inactive_after_minutes <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "inactive_after_minutes must be positive".to_string(),
            ));
        }

        if self.jobs.backfill_interval_minutes == 0 || self.jobs.location_interval_minutes == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Job intervals must be at least one minute".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load_with_defaults() {
        let config = Config::load_for_test(&[]).expect("Failed to load config");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.sync.debounce(), Duration::from_millis(300));
        assert_eq!(config.sync.precision(), PrecisionPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_override() {
        let config = Config::load_for_test(&[
            ("server.port", "9000"),
            ("logging.level", "debug"),
            ("sync.max_accuracy_meters", "80"),
        ])
        .expect("Failed to load config");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.sync.precision().max_accuracy, 80.0);
    }

    #[test]
    fn test_postgres_requires_url() {
        let config = Config::load_for_test(&[("store.backend", "postgres")])
            .expect("Failed to load config");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("CIRCLES__STORE__URL"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Config::load_for_test(&[("store.backend", "sqlite")]).is_err());
    }

    #[test]
    fn test_invalid_pool_settings() {
        let config = Config::load_for_test(&[
            ("store.min_connections", "100"),
            ("store.max_connections", "10"),
        ])
        .expect("Failed to load config");

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("min_connections"));
    }

    #[test]
    fn test_warning_threshold_above_limit() {
        let config = Config::load_for_test(&[("sync.warning_accuracy_meters", "70")])
            .expect("Failed to load config");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_socket_addr() {
        let config = Config::load_for_test(&[("server.host", "127.0.0.1"), ("server.port", "3000")])
            .expect("Failed to load config");

        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:3000");
    }
}
