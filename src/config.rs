//! Engine configuration
//!
//! Loaded from TOML. Every field has a default so an absent file is valid.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the config file location
pub const CONFIG_ENV_VAR: &str = "SESSION_SYNC_CONFIG";

const CONFIG_FILE_NAME: &str = "session-sync.toml";

/// Remote store connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the document service, e.g. `https://api.example.com/v1`
    pub base_url: String,
    /// Name of the environment variable holding the bearer token
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl StoreConfig {
    /// Resolve the bearer token, if one is configured
    pub fn api_key(&self) -> Result<Option<String>> {
        match &self.api_key_env {
            Some(var) => std::env::var(var)
                .map(Some)
                .context(format!("Environment variable {} not set", var)),
            None => Ok(None),
        }
    }
}

/// Configuration for a [`crate::SyncEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Collection holding session documents
    pub collection: String,
    /// Delay between the first queued write and the batch drain
    pub batch_delay_ms: u64,
    /// Two messages with equal text closer than this are the same message
    pub dedup_window_ms: i64,
    /// Cap for bulk listings
    pub list_limit: usize,
    /// Remote directory for uploaded images
    pub upload_directory: String,
    /// Prefix of the synthetic session URL
    pub url_prefix: String,
    pub store: Option<StoreConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            collection: "sessions".to_string(),
            batch_delay_ms: 1000,
            dedup_window_ms: 5000,
            list_limit: 1000,
            upload_directory: "images".to_string(),
            url_prefix: "session://".to_string(),
            store: None,
        }
    }
}

impl SyncConfig {
    /// Parse a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(raw).context("Failed to parse sync config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Load using explicit path, then the env override, then the platform
    /// config dir. Missing files fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let chosen = std::env::var(CONFIG_ENV_VAR)
            .ok()
            .map(PathBuf::from)
            .or_else(default_config_path);

        match chosen {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            bail!("collection must not be empty");
        }
        if self.dedup_window_ms <= 0 {
            bail!("dedup_window_ms must be positive");
        }
        if self.list_limit == 0 {
            bail!("list_limit must be positive");
        }
        Ok(())
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// `<platform config dir>/session-sync.toml`
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "session-sync").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
