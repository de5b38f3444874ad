//! Configuration loading

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ScrapeConfig;

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser sessions allowed at once
    pub max_concurrent: usize,
    /// Add the error source chain to 500 responses
    pub include_error_details: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_concurrent: 4,
            include_error_details: true,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scrape: ScrapeConfig,
}

impl AppConfig {
    /// Load defaults, then `path` (or `gamegrab.toml` if present), then
    /// `GAMEGRAB_*` environment variables, e.g. `GAMEGRAB_SERVER__PORT=9000`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("gamegrab").required(false),
        };

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).map_err(config_error)?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("GAMEGRAB")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?;

        config.try_deserialize().map_err(config_error)
    }
}

fn config_error(e: config::ConfigError) -> Error {
    Error::Config(e.to_string())
}
