//! Connection, table preview and migration orchestration for a pair of
//! databases (a source and a target) managed through a remote migration
//! backend.
//!
//! The entry point is [`Orchestrator`]: it owns one connection and one table
//! catalog per [`Role`], drives the [`MigrationEngine`] and keeps at most one
//! progress subscription alive.

pub mod api;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod migration;
pub mod orchestrator;
mod task;

pub use api::{HttpBackend, MigrationBackend};
pub use catalog::{PreviewStatus, TableCatalog, TableCatalogEntry, TablePreview};
pub use config::{
    Config, CredentialStore, FileCredentialStore, MemoryCredentialStore, SessionSettings,
};
pub use connection::{
    Connected, ConnectionManager, ConnectionState, ConnectionStatus, Credential, Role,
};
pub use error::{ApiError, ConnectionError, FetchError, MigrationError, ValidationError};
pub use migration::{
    MigrationEngine, MigrationHandle, MigrationPhase, MigrationRun, ProgressSubscription,
    ProgressTracker,
};
pub use orchestrator::{Orchestrator, SessionSnapshot, SideSnapshot};
