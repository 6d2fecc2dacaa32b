use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".simfuzz";

/// Prefix of environment overrides; nested keys are split on `__`.
pub const ENV_PREFIX: &str = "SIMFUZZ_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Output directory cannot be empty")]
    EmptyOutputDir,

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Runner program cannot be empty")]
    EmptyRunnerProgram,

    #[error("Invalid poll_interval_ms: {0}. Must be at least 1")]
    InvalidPollInterval(u64),

    #[error("Invalid max_runtime_ms: {0}. Must be at least 1")]
    InvalidMaxRuntime(u64),

    #[error("poll_interval_ms ({0}) must not exceed max_runtime_ms ({1})")]
    PollExceedsRuntime(u64, u64),

    #[error("Invalid load_limit: {0}. Must be at least 1")]
    InvalidLoadLimit(i64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.simfuzz/config.yaml`
    /// 3. `.simfuzz/local.yaml` (optional local overrides)
    /// 4. `SIMFUZZ_*` environment variables
    pub fn load() -> Result<Config> {
        let dir = Path::new(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; environment overrides still apply.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.output_dir.trim().is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.runner.program.trim().is_empty() {
            return Err(ConfigError::EmptyRunnerProgram);
        }

        let supervision = &config.supervision;
        if supervision.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval(supervision.poll_interval_ms));
        }
        if supervision.max_runtime_ms == 0 {
            return Err(ConfigError::InvalidMaxRuntime(supervision.max_runtime_ms));
        }
        if supervision.poll_interval_ms > supervision.max_runtime_ms {
            return Err(ConfigError::PollExceedsRuntime(
                supervision.poll_interval_ms,
                supervision.max_runtime_ms,
            ));
        }

        if config.recovery.load_limit < 1 {
            return Err(ConfigError::InvalidLoadLimit(config.recovery.load_limit));
        }

        Ok(())
    }
}
