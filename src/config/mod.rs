//! Application configuration.
//!
//! Loaded from YAML files and `WAYMARK__*` environment variables.

mod storage;
mod subscription;

pub use storage::{StorageConfig, StorageType};
pub use subscription::SubscriptionConfig;

use serde::Deserialize;

use crate::utils::retry::RetryConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "WAYMARK_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "WAYMARK";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "WAYMARK_LOG";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub subscription: SubscriptionConfig,
    pub storage: StorageConfig,
    /// Backoff for transient and handler failures.
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, `__` separated
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document without consulting files or the environment.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runner cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sub = &self.subscription;
        if sub.id.trim().is_empty() {
            return Err(ConfigError::Invalid("subscription.id must not be empty".into()));
        }
        if sub.batch_size == 0 {
            return Err(ConfigError::Invalid("subscription.batch_size must be at least 1".into()));
        }
        if sub.liveness_threshold == 0 {
            return Err(ConfigError::Invalid(
                "subscription.liveness_threshold must be at least 1".into(),
            ));
        }
        if sub.poll_interval_ms > sub.max_poll_interval_ms {
            return Err(ConfigError::Invalid(
                "subscription.poll_interval_ms exceeds max_poll_interval_ms".into(),
            ));
        }
        if sub.report_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "subscription.report_interval_secs must be at least 1".into(),
            ));
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::Invalid("storage.max_connections must be at least 1".into()));
        }

        match self.storage.storage_type {
            StorageType::Sqlite if !cfg!(feature = "sqlite") => Err(ConfigError::Invalid(
                "storage.type sqlite requires the `sqlite` feature".into(),
            )),
            StorageType::Postgres if !cfg!(feature = "postgres") => Err(ConfigError::Invalid(
                "storage.type postgres requires the `postgres` feature".into(),
            )),
            StorageType::Postgres if self.storage.url.is_empty() => {
                Err(ConfigError::Invalid("storage.url must be set for postgres".into()))
            }
            _ => Ok(()),
        }
    }
}
