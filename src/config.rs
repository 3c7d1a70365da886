//! Configuration management for Shiori.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "Shiori";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Browser-like User-Agent sent with every request unless an adapter overrides it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Web scraping settings.
    pub scraping: ScrapingConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// Web scraping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Delay before each web request in seconds.
    pub delay_between_requests_sec: f64,

    /// Maximum number of input URLs decomposed at the same time.
    pub max_concurrent_requests: usize,

    /// Total attempts per request (first try included) for transient failures.
    pub retries: u32,

    /// Backoff before the first retry in milliseconds; doubles on each retry.
    pub retry_backoff_ms: u64,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Default User-Agent header.
    pub user_agent: String,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            delay_between_requests_sec: 1.0,
            max_concurrent_requests: 4,
            retries: 3,
            retry_backoff_ms: 1000,
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory searched for Netscape cookie files (e.g. `pixiv-cookies.txt`).
    /// Defaults to the config directory.
    pub cookies_directory: Option<PathBuf>,
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraping.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scraping.max_concurrent_requests".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.scraping.retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scraping.retries".to_string(),
                message: "must be at least 1 (the first attempt counts)".to_string(),
            });
        }

        if self.scraping.delay_between_requests_sec < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "scraping.delay_between_requests_sec".to_string(),
                message: "must not be negative".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the effective cookie directory, using config or default.
    pub fn cookies_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.paths.cookies_directory {
            Ok(dir.clone())
        } else {
            Self::config_dir()
        }
    }
}
