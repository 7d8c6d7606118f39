//! Command-line interface parsing for the Pokedex CLI
//!
//! This module handles parsing of CLI arguments using clap and layering them on top
//! of the file and environment configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, ConfigError};

/// Pokedex CLI - Explore PokeAPI locations and catch Pokemon
#[derive(Parser, Debug)]
#[command(name = "pokedex")]
#[command(about = "Explore PokeAPI location areas and catch Pokemon from your terminal")]
#[command(version)]
pub struct Cli {
    /// Seconds a response stays cached; expired entries are swept on the same period
    #[arg(long, value_name = "SECS")]
    pub cache_interval: Option<u64>,

    /// PokeAPI root URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Log level written to stderr (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Read configuration from this TOML file in addition to the user config
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Applies any flags that were given on top of `config`
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(secs) = self.cache_interval {
            config.cache_interval_secs = secs;
        }
        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
        }
        if let Some(ref level) = self.log_level {
            config.log_level = level.to_lowercase();
        }
        config
    }
}

/// Loads configuration from every source and applies CLI flags last.
///
/// # Arguments
/// * `cli` - The parsed CLI struct
///
/// # Returns
/// * `Ok(Config)` with flags applied and validated
/// * `Err(ConfigError)` if loading fails or the result is invalid
pub fn resolve_config(cli: &Cli) -> Result<Config, ConfigError> {
    let config = cli.apply(Config::load(cli.config.as_deref())?);
    config.validate()?;
    Ok(config)
}
