//! Layered configuration for the Pokedex CLI
//!
//! Values are merged from, lowest to highest precedence: built-in defaults, the
//! user config file in the XDG config directory (`~/.config/pokedex/config.toml`
//! on Linux), an explicit `--config` file, and `POKEDEX_*` environment variables.
//! Command-line flags are applied on top by [`crate::cli::resolve_config`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::data::DEFAULT_BASE_URL;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Longest accepted cache interval (one week)
pub const MAX_CACHE_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid cache interval: must be between 1 and {MAX_CACHE_INTERVAL_SECS} seconds")]
    InvalidCacheInterval,

    #[error("Base URL cannot be empty")]
    EmptyBaseUrl,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Config file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sweep period and maximum age of cached responses, in seconds
    pub cache_interval_secs: u64,
    /// PokeAPI root URL
    pub base_url: String,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Pause before a catch result is shown, in milliseconds
    pub throw_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_interval_secs: 300, // 5 minutes
            base_url: DEFAULT_BASE_URL.to_string(),
            log_level: "warn".to_string(),
            throw_delay_ms: 500,
        }
    }
}

impl Config {
    /// Path of the per-user config file, if a home directory can be determined
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "pokedex")?;
        Some(project_dirs.config_dir().join("config.toml"))
    }

    /// Builds the full provider stack without extracting it
    pub fn figment(explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = Self::default_path() {
            figment = figment.merge(Toml::file(path));
        }
        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("POKEDEX_"))
    }

    /// Loads configuration from every source
    ///
    /// # Arguments
    /// * `explicit` - A config file that must exist (from `--config`)
    ///
    /// # Returns
    /// * `Ok(Config)` once merged and validated
    /// * `Err(ConfigError)` if a file is missing or malformed, or validation fails
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
        }
        Self::from_figment(Self::figment(explicit))
    }

    /// Extracts and validates a configuration from an arbitrary figment
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let mut config: Config = figment.extract()?;
        config.log_level = config.log_level.to_lowercase();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CACHE_INTERVAL_SECS).contains(&self.cache_interval_secs) {
            return Err(ConfigError::InvalidCacheInterval);
        }

        if self.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }

        Ok(())
    }

    pub fn cache_interval(&self) -> Duration {
        Duration::from_secs(self.cache_interval_secs)
    }

    pub fn throw_delay(&self) -> Duration {
        Duration::from_millis(self.throw_delay_ms)
    }

    /// The configured log level, falling back to `warn` if it does not parse
    pub fn log_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::WARN)
    }
}
