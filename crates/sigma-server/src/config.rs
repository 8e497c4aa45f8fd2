//! Server configuration.

use anyhow::Result;
use serde::Deserialize;
use sigma_core::MIN_PUSH_INTERVAL;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Milliseconds between push-stream frames.
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_push_interval_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            push_interval_ms: default_push_interval_ms(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from config/default.toml, then the user config dir, or
    /// fall back to defaults.
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.exists() {
                tracing::debug!(target: "sigma::startup", "Loading config from {}", path.display());
                return Self::load_from(&path);
            }
        }

        Ok(Config::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config/default.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("sigma").join("config.toml"));
        }
        paths
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms).max(MIN_PUSH_INTERVAL)
    }
}
