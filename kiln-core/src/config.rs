//! Configuration management.

use crate::drivers::EngineEndpoint;
use crate::error::{KilnError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent configuration for kiln.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub default_endpoint: String,
    /// Backend for new builders when `--driver` is not given
    pub default_driver: Option<String>,
    pub store_dir: String,
    pub state_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_endpoint: paths::DEFAULT_ENDPOINT.to_string(),
            default_driver: None,
            store_dir: paths::store_dir().to_string_lossy().to_string(),
            state_dir: paths::state_dir().to_string_lossy().to_string(),
        }
    }
}

impl Config {
    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        paths::config_dir().join("config.json")
    }

    /// Load configuration from disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| KilnError::InvalidConfig {
            reason: format!("Failed to read config: {}", e),
        })?;
        serde_json::from_str(&content).map_err(|e| KilnError::InvalidConfig {
            reason: format!("Failed to parse config: {}", e),
        })
    }

    /// The active engine endpoint string: `KILN_HOST`, else `default_endpoint`.
    ///
    /// This is also the scope key for current builder selection.
    pub fn endpoint(&self) -> String {
        paths::host_endpoint().unwrap_or_else(|| self.default_endpoint.clone())
    }

    /// The active engine endpoint, parsed.
    pub fn engine_endpoint(&self) -> Result<EngineEndpoint> {
        self.endpoint().parse()
    }
}
