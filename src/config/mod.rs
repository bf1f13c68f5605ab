//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod engine;
mod server;
mod storage;

pub use engine::{
    paid_statuses, CommerceConfig, CreditsConfig, ReconciliationConfig, RewardsConfig,
};
pub use server::{LoggingConfig, ServerConfig};
pub use storage::{PostgresConfig, SqliteConfig, StorageConfig};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "CREDIT_LEDGER_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "CREDIT_LEDGER";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "CREDIT_LEDGER_LOG";

use serde::Deserialize;

/// Configuration loading or validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// gRPC server configuration.
    pub server: ServerConfig,
    /// Ledger storage configuration.
    pub storage: StorageConfig,
    /// External commerce system.
    pub commerce: CommerceConfig,
    /// Purchase conversion rates.
    pub credits: CreditsConfig,
    /// Daily free-credit grants.
    pub rewards: RewardsConfig,
    /// Reconciliation sweep.
    pub reconciliation: ReconciliationConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
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

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("reconciliation.statuses")
                    .with_list_parse_key("credits.eligible_statuses")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break ledger invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rewards = &self.rewards;
        if rewards.daily_image_reward < 0 || rewards.daily_text_reward < 0 {
            return Err(ConfigError::Invalid("daily rewards must be >= 0".to_string()));
        }
        if rewards.max_free_image_credits < 0 || rewards.max_free_text_credits < 0 {
            return Err(ConfigError::Invalid("free-credit caps must be >= 0".to_string()));
        }
        if self.credits.image_credits_per_currency_unit.is_sign_negative()
            || self.credits.text_credits_per_currency_unit.is_sign_negative()
        {
            return Err(ConfigError::Invalid("conversion rates must be >= 0".to_string()));
        }
        if self.credits.eligible_statuses.is_empty() {
            return Err(ConfigError::Invalid(
                "credits.eligible_statuses must not be empty".to_string(),
            ));
        }
        if let Some(status) = self
            .reconciliation
            .statuses
            .iter()
            .find(|s| !self.credits.eligible_statuses.contains(s))
        {
            return Err(ConfigError::Invalid(format!(
                "reconciliation.statuses includes '{status}', \
                 which is not in credits.eligible_statuses"
            )));
        }
        if self.reconciliation.interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation.interval_seconds must be > 0".to_string(),
            ));
        }
        if self.reconciliation.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation.concurrency must be > 0".to_string(),
            ));
        }
        if rewards.schedule && rewards.schedule_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "rewards.schedule_interval_seconds must be > 0".to_string(),
            ));
        }
        if self.commerce.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("commerce.timeout_seconds must be > 0".to_string()));
        }
        Ok(())
    }

    /// Create config for testing: in-memory storage, no scheduling.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.storage.storage_type = "memory".to_string();
        config.reconciliation.enabled = false;
        config
    }
}
