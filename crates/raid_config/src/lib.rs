//! Configuration for the Raidlink sync core
//!
//! Loads and validates `raidlink.toml`. Every field has a serde default so
//! a missing file or a partial file yields a usable configuration.

use raid_common::{RaidError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Local store settings
    #[serde(default)]
    pub store: StoreConfig,
}

/// Remote API configuration ([remote])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the backend API, e.g. `https://api.example.org/v1`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds; expirations count as connectivity
    /// failures and trigger the cache fallback
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Local store configuration ([store])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the SQLite cache database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".raidlink/cache.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| RaidError::Config(format!("failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| RaidError::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            return Err(RaidError::Config(
                "remote.base_url must start with http:// or https://".to_string(),
            ));
        }
        if self.remote.timeout_secs == 0 {
            return Err(RaidError::Config(
                "remote.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
