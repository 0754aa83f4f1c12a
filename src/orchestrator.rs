//! Session object tying both database sides to the migration engine

use crate::api::{HttpBackend, MigrationBackend};
use crate::catalog::{TableCatalog, TableCatalogEntry, TablePreview};
use crate::config::{Config, CredentialStore, FileCredentialStore, SessionSettings};
use crate::connection::{Connected, ConnectionManager, ConnectionState, Role};
use crate::error::{ConnectionError, FetchError, MigrationError, ValidationError};
use crate::migration::{
    MigrationEngine, MigrationHandle, MigrationRun, ProgressSubscription, ProgressTracker,
};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

struct Side {
    connection: ConnectionManager,
    catalog: TableCatalog,
}

impl Side {
    fn new(
        role: Role,
        backend: &Arc<dyn MigrationBackend>,
        store: &Arc<dyn CredentialStore>,
        row_limit: usize,
    ) -> Self {
        Self {
            connection: ConnectionManager::new(role, Arc::clone(backend), Arc::clone(store)),
            catalog: TableCatalog::new(role, Arc::clone(backend), row_limit),
        }
    }

    fn snapshot(&self) -> SideSnapshot {
        SideSnapshot {
            connection: self.connection.state(),
            catalog: self.catalog.entry(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SideSnapshot {
    pub connection: ConnectionState,
    pub catalog: TableCatalogEntry,
}

/// Everything a presentation layer needs to draw one frame
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub source: SideSnapshot,
    pub target: SideSnapshot,
    /// The current run, or an idle one once both tables are selected
    pub migration: Option<MigrationRun>,
    pub can_migrate: bool,
}

/// One migration session: a source side, a target side and the engine.
///
/// Construct once and share by reference. Every background task it starts
/// is cancelled by [`Orchestrator::shutdown`] or when it is dropped.
pub struct Orchestrator {
    source: Side,
    target: Side,
    engine: Arc<MigrationEngine>,
    tracker: ProgressTracker,
    progress: Mutex<Option<ProgressSubscription>>,
    settings: SessionSettings,
    store: Arc<dyn CredentialStore>,
    token: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn MigrationBackend>,
        store: Arc<dyn CredentialStore>,
        settings: SessionSettings,
    ) -> Self {
        let token = CancellationToken::new();
        let engine = Arc::new(MigrationEngine::new(Arc::clone(&backend), token.child_token()));
        let tracker = ProgressTracker::new(Arc::clone(&engine), token.child_token());

        Self {
            source: Side::new(Role::Source, &backend, &store, settings.preview_row_limit),
            target: Side::new(Role::Target, &backend, &store, settings.preview_row_limit),
            engine,
            tracker,
            progress: Mutex::new(None),
            settings,
            store,
            token,
        }
    }

    /// HTTP backend and file credential store as configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = HttpBackend::from_config(&config.backend, &config.resilience)
            .context("Failed to create migration backend client")?;
        let store = FileCredentialStore::open_default()?;

        info!("Using migration backend at {}", backend.base_url());
        Ok(Self::new(Arc::new(backend), Arc::new(store), config.session.clone()))
    }

    fn side(&self, role: Role) -> &Side {
        match role {
            Role::Source => &self.source,
            Role::Target => &self.target,
        }
    }

    fn progress_slot(&self) -> MutexGuard<'_, Option<ProgressSubscription>> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connection(&self, role: Role) -> &ConnectionManager {
        &self.side(role).connection
    }

    pub fn catalog(&self, role: Role) -> &TableCatalog {
        &self.side(role).catalog
    }

    pub fn engine(&self) -> &Arc<MigrationEngine> {
        &self.engine
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Connect `role`, then list its tables.
    ///
    /// A failed listing does not undo the connection; it is recorded in the
    /// catalog entry's `listing_error`.
    pub async fn connect(
        &self,
        role: Role,
        credential: &str,
    ) -> Result<Connected, ConnectionError> {
        let side = self.side(role);
        let connected = side.connection.connect(credential).await?;

        if let Err(err) = side.catalog.list_tables(&side.connection).await {
            warn!("Connected {} database but listing tables failed: {}", role, err);
        }
        Ok(connected)
    }

    /// Disconnect `role` and clear its tables, selection and preview.
    ///
    /// A running migration is not affected: the transfer runs on the backend.
    pub fn disconnect(&self, role: Role) {
        let side = self.side(role);
        side.connection.disconnect();
        side.catalog.clear();
    }

    pub async fn list_tables(&self, role: Role) -> Result<Vec<String>, FetchError> {
        let side = self.side(role);
        side.catalog.list_tables(&side.connection).await
    }

    pub async fn select_table(&self, role: Role, table: &str) -> Result<TablePreview, FetchError> {
        let side = self.side(role);
        side.catalog.select_table(&side.connection, table).await
    }

    fn selections(&self) -> Option<(String, String)> {
        Some((self.source.catalog.selected_table()?, self.target.catalog.selected_table()?))
    }

    /// Both sides connected with a table selected, and nothing running
    pub fn can_migrate(&self) -> bool {
        Role::ALL.iter().all(|role| self.side(*role).connection.is_connected())
            && self.selections().is_some()
            && !self.engine.is_running()
    }

    /// Start migrating the selected source table into the selected target
    /// table, and begin polling its progress.
    pub fn start_migration(&self) -> Result<MigrationHandle, MigrationError> {
        if let Some(role) = Role::ALL
            .into_iter()
            .find(|role| !self.side(*role).connection.is_connected())
        {
            return Err(MigrationError::NotReady(role));
        }
        let (source_table, target_table) = self
            .selections()
            .ok_or(ValidationError::MissingSelection)?;

        let handle = self.engine.start(&source_table, &target_table)?;
        let subscription = self.tracker.watch(handle, self.settings.poll_interval())?;
        *self.progress_slot() = Some(subscription);
        Ok(handle)
    }

    pub fn query_progress(&self, handle: MigrationHandle) -> Result<MigrationRun, MigrationError> {
        self.engine.query_progress(handle)
    }

    /// Snapshots published by the active progress subscription
    pub fn progress(&self) -> Option<watch::Receiver<MigrationRun>> {
        self.progress_slot().as_ref().map(ProgressSubscription::receiver)
    }

    /// Stop polling; the migration itself keeps running
    pub fn cancel_progress(&self) {
        self.tracker.cancel();
        if self.progress_slot().take().is_some() {
            debug!("Progress subscription cancelled");
        }
    }

    /// The current run, or an idle run once both tables are selected
    pub fn migration(&self) -> Option<MigrationRun> {
        self.engine.current().or_else(|| {
            self.selections()
                .map(|(source, target)| MigrationRun::idle(source, target))
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            source: self.source.snapshot(),
            target: self.target.snapshot(),
            migration: self.migration(),
            can_migrate: self.can_migrate(),
        }
    }

    /// Reconnect each role with its persisted credential, both at once.
    ///
    /// Roles without a stored credential are skipped. Returns the outcome of
    /// every attempt made; a failed attempt keeps the stored credential.
    pub async fn restore_sessions(&self) -> Vec<(Role, Result<Connected, ConnectionError>)> {
        if !self.settings.restore_sessions {
            return Vec::new();
        }

        let (source, target) = tokio::join!(self.restore(Role::Source), self.restore(Role::Target));
        source.into_iter().chain(target).collect()
    }

    async fn restore(&self, role: Role) -> Option<(Role, Result<Connected, ConnectionError>)> {
        let credential = match self.store.load(role) {
            Ok(Some(credential)) => credential,
            Ok(None) => return None,
            Err(err) => {
                warn!("Failed to read persisted {} credential: {:#}", role, err);
                return None;
            }
        };

        info!("Restoring {} database session", role);
        Some((role, self.connect(role, &credential).await))
    }

    /// Cancel polling and any transfer still awaited
    pub fn shutdown(&self) {
        self.cancel_progress();
        self.engine.shutdown();
        self.token.cancel();
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
