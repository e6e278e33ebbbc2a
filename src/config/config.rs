//! Main configuration structures for rustmatch

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::params::*;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main matching configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Matcher parameters
    pub matcher: MatcherParams,
    /// Extractor parameters
    pub extractor: ExtractorParams,
    /// Capture session parameters
    pub session: SessionParams,
}

impl MatchConfig {
    /// Configuration using the kd-forest matcher
    pub fn approximate() -> Self {
        Self {
            matcher: MatcherParams {
                strategy: MatchStrategy::Approximate,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check values the matchers and session cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let matcher = &self.matcher;
        if !(matcher.ratio > 0.0 && matcher.ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "matcher.ratio must be in (0, 1], got {}",
                matcher.ratio
            )));
        }
        if matcher.tree_count == 0 {
            return Err(ConfigError::Invalid("matcher.tree_count must be at least 1".to_string()));
        }
        if matcher.search_budget == 0 {
            return Err(ConfigError::Invalid("matcher.search_budget must be at least 1".to_string()));
        }
        if self.session.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid("session.poll_timeout_ms must be at least 1".to_string()));
        }
        if self.session.capture_key == self.session.quit_key {
            return Err(ConfigError::Invalid(format!(
                "session.capture_key and session.quit_key are both '{}'",
                self.session.quit_key
            )));
        }
        Ok(())
    }
}

/// Configuration loader supporting YAML and TOML
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration, picking the format from the file
    /// extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<MatchConfig, ConfigError> {
        let path = path.as_ref();
        let extension = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        let config = match extension.to_lowercase().as_str() {
            "yaml" | "yml" => Self::load_yaml(path)?,
            "toml" => Self::load_toml(path)?,
            _ => return Err(ConfigError::UnsupportedFormat(extension.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from YAML file
    pub fn load_yaml<P: AsRef<Path>>(path: P) -> Result<MatchConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: MatchConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<MatchConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: MatchConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn save_yaml<P: AsRef<Path>>(config: &MatchConfig, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(config)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_toml<P: AsRef<Path>>(config: &MatchConfig, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string(config)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
