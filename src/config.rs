//! Configuration management for subjectlog

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::sink::DEFAULT_QUEUE_CAPACITY;

/// Log root used in production
pub const PRODUCTION_PATH: &str = "/applog";

/// Log root used in development
pub const DEVELOPMENT_PATH: &str = "./applog";

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "SUBJECTLOG_CONFIG";

/// Config file used when `SUBJECTLOG_CONFIG` is not set
const DEFAULT_CONFIG_FILE: &str = "subjectlog.toml";

/// Logger configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Name of the service; its logs live under `<root>/<service>`
    #[serde(default)]
    pub service: String,

    /// Minimum level: DEBUG, INFO, WARN, ERROR or FATAL (default: INFO)
    #[serde(default = "default_level")]
    pub level: String,

    /// Explicit log root (default: /applog, or ./applog in development)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Development mode switches the default root to ./applog
    #[serde(default)]
    pub development: bool,

    /// Maximum queued rotation requests (default: 64)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_level() -> String {
    "INFO".to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: String::new(),
            level: default_level(),
            path: None,
            development: false,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from file, or return default if not found
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Log root before the service directory is appended
    pub fn root_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None if self.development => PathBuf::from(DEVELOPMENT_PATH),
            None => PathBuf::from(PRODUCTION_PATH),
        }
    }
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}
