use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::HomrConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid {name}: {value}. Must be between 0.0 and 1.0")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Invalid {name}: must be greater than 0")]
    NotPositive { name: &'static str },

    #[error("Invalid healthy_alignment_threshold: {0}. Must be at most 100")]
    InvalidAlignment(u8),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .homr/config.yaml (project config)
    /// 3. .homr/local.yaml (project local overrides, optional)
    /// 4. Environment variables (HOMR_* prefix, `__` separates nested keys)
    pub fn load() -> Result<HomrConfig> {
        let config: HomrConfig = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<HomrConfig> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let config: HomrConfig = Figment::new()
            .merge(Serialized::defaults(HomrConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("HOMR_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(HomrConfig::default()))
            .merge(Yaml::file(".homr/config.yaml"))
            .merge(Yaml::file(".homr/local.yaml"))
            .merge(Env::prefixed("HOMR_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &HomrConfig) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        let positive = [
            ("completion.timeout_secs", config.completion.timeout_secs == 0),
            ("completion.max_turns", config.completion.max_turns == 0),
            ("completion.max_tokens", config.completion.max_tokens == 0),
            ("observer.max_output_chars", config.observer.max_output_chars == 0),
            ("observer.failure_window", config.observer.failure_window == 0),
            (
                "observer.consecutive_failure_threshold",
                config.observer.consecutive_failure_threshold == 0,
            ),
            ("steering.max_discoveries", config.steering.max_discoveries == 0),
            ("escalator.min_shared_keywords", config.escalator.min_shared_keywords == 0),
            ("analysis.default_lookback_days", config.analysis.default_lookback_days == 0),
            ("analysis.default_max_proposals", config.analysis.default_max_proposals == 0),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, zero)| *zero) {
            return Err(ConfigError::NotPositive { name });
        }

        if config.observer.healthy_alignment_threshold > 100 {
            return Err(ConfigError::InvalidAlignment(config.observer.healthy_alignment_threshold));
        }

        let threshold = config.auto_resolve.default_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold {
                name: "auto_resolve.default_confidence_threshold",
                value: threshold,
            });
        }

        Ok(())
    }
}
