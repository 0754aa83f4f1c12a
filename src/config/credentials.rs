//! Persisted credentials, one connection string per role
//!
//! Written after a successful connect, cleared on disconnect, and read once
//! at start to reconnect silently.

use super::config_dir;
use crate::connection::Role;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub trait CredentialStore: Send + Sync {
    fn load(&self, role: Role) -> Result<Option<String>>;
    fn save(&self, role: Role, credential: &str) -> Result<()>;
    fn clear(&self, role: Role) -> Result<()>;
}

/// On-disk layout: `source = "..."`, `target = "..."`
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
}

impl SessionFile {
    fn slot(&mut self, role: Role) -> &mut Option<String> {
        match role {
            Role::Source => &mut self.source,
            Role::Target => &mut self.target,
        }
    }
}

/// TOML file store, `sessions.toml` next to the config file by default
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(config_dir()?.join("sessions.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<SessionFile> {
        if !self.path.exists() {
            return Ok(SessionFile::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file: {:?}", self.path))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {:?}", self.path))
    }

    fn write(&self, file: &SessionFile) -> Result<()> {
        let content = toml::to_string_pretty(file).context("Failed to serialize session file")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write session file: {:?}", self.path))
    }

    fn update(&self, role: Role, value: Option<String>) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.read()?;
        *file.slot(role) = value;
        self.write(&file)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, role: Role) -> Result<Option<String>> {
        let mut file = self.read()?;
        Ok(file.slot(role).take())
    }

    fn save(&self, role: Role, credential: &str) -> Result<()> {
        self.update(role, Some(credential.to_string()))?;
        info!("Saved {} credential", role);
        Ok(())
    }

    fn clear(&self, role: Role) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(role, None)?;
        debug!("Cleared {} credential", role);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<Role, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Role, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, role: Role) -> Result<Option<String>> {
        Ok(self.lock().get(&role).cloned())
    }

    fn save(&self, role: Role, credential: &str) -> Result<()> {
        self.lock().insert(role, credential.to_string());
        Ok(())
    }

    fn clear(&self, role: Role) -> Result<()> {
        self.lock().remove(&role);
        Ok(())
    }
}
