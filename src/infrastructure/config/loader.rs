use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid requests_per_second: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Assistant name cannot be empty")]
    EmptyAssistantName,

    #[error("Invalid max_perspectives: {0}. Must be at least 1")]
    InvalidMaxPerspectives(usize),

    #[error("Invalid silence threshold: {0}. Must be positive")]
    InvalidSilenceThreshold(f64),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .colloquy/config.yaml (project config)
    /// 3. .colloquy/local.yaml (local overrides, optional)
    /// 4. Environment variables (COLLOQUY_* prefix, `__` nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".colloquy/config.yaml"))
            .merge(Yaml::file(".colloquy/local.yaml"))
            .merge(Env::prefixed("COLLOQUY_").split("__"))
            .extract()
            .context("failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.moderator.assistant_name.trim().is_empty() {
            return Err(ConfigError::EmptyAssistantName);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        if config.model.requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(
                config.model.requests_per_second,
            ));
        }
        if config.model.retry.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.model.retry.max_retries));
        }
        if config.model.retry.initial_backoff_ms >= config.model.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.model.retry.initial_backoff_ms,
                config.model.retry.max_backoff_ms,
            ));
        }

        if config.orchestrator.max_perspectives == 0 {
            return Err(ConfigError::InvalidMaxPerspectives(
                config.orchestrator.max_perspectives,
            ));
        }

        if config.scheduler.silence_threshold_secs <= 0.0 {
            return Err(ConfigError::InvalidSilenceThreshold(
                config.scheduler.silence_threshold_secs,
            ));
        }
        if config.aggregator.silence_threshold_secs <= 0.0 {
            return Err(ConfigError::InvalidSilenceThreshold(
                config.aggregator.silence_threshold_secs,
            ));
        }

        Ok(())
    }
}
