use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod credentials;

pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

use crate::api::constants::DEFAULT_BASE_URL;

/// Overrides `backend.base_url` when set (also read from `.env`)
pub const API_URL_ENV: &str = "TABLE_MIGRATE_API_URL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub resilience: ResilienceSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Upper bound for the migrate call; unset waits for the transfer to end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrate_timeout_secs: Option<u64>,
    /// `{role}` path segment used for the source database
    #[serde(default = "default_source_path")]
    pub source_path: String,
    #[serde(default = "default_target_path")]
    pub target_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_preview_row_limit")]
    pub preview_row_limit: usize,
    /// Reconnect with persisted credentials on start
    #[serde(default = "default_true")]
    pub restore_sessions: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceSettings {
    /// Retries after the first attempt of a read or connect call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_true")]
    pub rate_limiting: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_source_path() -> String {
    "source".to_string()
}

fn default_target_path() -> String {
    "target".to_string()
}

fn default_poll_interval() -> u64 {
    20_000
}

fn default_preview_row_limit() -> usize {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_requests_per_minute() -> u32 {
    120
}

fn default_true() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            migrate_timeout_secs: None,
            source_path: default_source_path(),
            target_path: default_target_path(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            preview_row_limit: default_preview_row_limit(),
            restore_sessions: true,
        }
    }
}

impl SessionSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            requests_per_minute: default_requests_per_minute(),
            rate_limiting: true,
        }
    }
}

/// `<config_dir>/table-migrate` on Linux, `~/.table-migrate` elsewhere
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = if cfg!(target_os = "linux") {
        dirs::config_dir()
            .context("Failed to get XDG config directory")?
            .join("table-migrate")
    } else {
        dirs::home_dir()
            .context("Failed to get home directory")?
            .join(".table-migrate")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
        info!("Created config directory: {:?}", config_dir);
    }

    Ok(config_dir)
}

impl Config {
    pub fn get_config_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load_from(&Self::get_config_path()?)?;
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                debug!("Using backend URL from {}", API_URL_ENV);
                config.backend.base_url = url.trim().to_string();
            }
        }
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from: {:?}", path);

        if !path.exists() {
            info!("Config file doesn't exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        debug!("Saving config to: {:?}", path);

        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        info!("Config saved successfully");
        Ok(())
    }
}
