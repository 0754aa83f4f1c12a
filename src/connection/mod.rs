//! Per-role connection lifecycle
//!
//! `disconnected -> connecting -> {connected, failed}`; `disconnect` resets
//! to `disconnected` from any state. Every reset bumps the role's generation
//! so that a connect attempt still in flight cannot resurrect a connection
//! the caller already dropped.

pub mod credential;

use crate::api::MigrationBackend;
use crate::config::CredentialStore;
use crate::error::ConnectionError;
use crate::task::guarded;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use credential::Credential;

/// Which side of a migration a database plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Source,
    Target,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Source, Role::Target];

    /// Wire and storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Source => "source",
            Role::Target => "target",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub role: Role,
    pub credential: Option<Credential>,
    pub status: ConnectionStatus,
    /// Set only while `status` is `Failed`
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            credential: None,
            status: ConnectionStatus::Disconnected,
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Proof of a successful connect for one generation of a role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connected {
    pub role: Role,
    pub generation: u64,
}

struct Slot {
    state: ConnectionState,
    generation: u64,
}

pub struct ConnectionManager {
    role: Role,
    backend: Arc<dyn MigrationBackend>,
    store: Arc<dyn CredentialStore>,
    slot: Mutex<Slot>,
    // orders store writes without holding `slot` during file I/O
    persist: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(
        role: Role,
        backend: Arc<dyn MigrationBackend>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            role,
            backend,
            store,
            slot: Mutex::new(Slot {
                state: ConnectionState::new(role),
                generation: 0,
            }),
            persist: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.lock().state.status
    }

    pub fn is_connected(&self) -> bool {
        self.lock().state.is_connected()
    }

    /// Current generation; changes on every disconnect
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Generation of the live connection, `None` unless connected
    pub fn connected_generation(&self) -> Option<u64> {
        let slot = self.lock();
        slot.state.is_connected().then_some(slot.generation)
    }

    /// Validate `raw`, then ask the backend to connect.
    ///
    /// A malformed credential fails before any backend call. On success the
    /// credential is persisted for session resumption; on failure it is not.
    pub async fn connect(&self, raw: &str) -> Result<Connected, ConnectionError> {
        let (credential, generation) = {
            let mut slot = self.lock();
            match slot.state.status {
                ConnectionStatus::Connecting => {
                    return Err(ConnectionError::AlreadyInProgress(self.role));
                }
                ConnectionStatus::Connected => {
                    return Err(ConnectionError::AlreadyConnected(self.role));
                }
                ConnectionStatus::Disconnected | ConnectionStatus::Failed => {}
            }

            let credential = match Credential::parse(self.role, raw) {
                Ok(credential) => credential,
                Err(err) => {
                    slot.state = ConnectionState {
                        role: self.role,
                        credential: None,
                        status: ConnectionStatus::Failed,
                        last_error: Some(err.to_string()),
                    };
                    return Err(err.into());
                }
            };

            slot.state = ConnectionState {
                role: self.role,
                credential: Some(credential.clone()),
                status: ConnectionStatus::Connecting,
                last_error: None,
            };
            (credential, slot.generation)
        };

        info!("Connecting {} database at {}", self.role, credential);
        let outcome = guarded(self.backend.connect(self.role, credential.expose())).await;

        let mut slot = self.lock();
        if slot.generation != generation {
            warn!(
                "Discarding connect result for {} database: disconnected meanwhile",
                self.role
            );
            return Err(ConnectionError::Superseded(self.role));
        }

        let err = match outcome {
            Ok(response) if response.success => {
                slot.state.status = ConnectionStatus::Connected;
                drop(slot);
                info!("Connected {} database ({})", self.role, credential);
                self.persist(generation, &credential);
                return Ok(Connected {
                    role: self.role,
                    generation,
                });
            }
            Ok(response) => ConnectionError::Rejected {
                role: self.role,
                message: if response.message.trim().is_empty() {
                    "connection refused by backend".to_string()
                } else {
                    response.message
                },
            },
            Err(source) => match source.rejection_message() {
                Some(message) => ConnectionError::Rejected {
                    role: self.role,
                    message: message.to_string(),
                },
                None => ConnectionError::Unreachable { role: self.role, source },
            },
        };

        warn!("{}", err);
        slot.state.status = ConnectionStatus::Failed;
        slot.state.last_error = Some(err.to_string());
        Err(err)
    }

    /// Reset to `disconnected` and forget the persisted credential.
    ///
    /// Idempotent. Any connect still in flight for this role is discarded
    /// when it completes.
    pub fn disconnect(&self) {
        let was = {
            let mut slot = self.lock();
            slot.generation += 1;
            std::mem::replace(&mut slot.state, ConnectionState::new(self.role)).status
        };

        let _persist = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = self.store.clear(self.role) {
            warn!("Failed to clear persisted {} credential: {:#}", self.role, err);
        }

        if was != ConnectionStatus::Disconnected {
            info!("Disconnected {} database", self.role);
        }
    }

    /// Save `credential` unless `generation` was disconnected meanwhile
    fn persist(&self, generation: u64, credential: &Credential) {
        let _persist = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        if self.generation() != generation {
            return;
        }
        if let Err(err) = self.store.save(self.role, credential.expose()) {
            warn!("Failed to persist {} credential: {:#}", self.role, err);
        }
    }
}
