//! Table listing and previews for one database role
//!
//! Two counters guard asynchronous completions:
//! - `epoch` changes when the catalog is cleared (disconnect), discarding any
//!   listing or preview still in flight;
//! - `selection` changes on every selection (and when a listing drops the
//!   selected table), so only the latest `select_table` may write the preview.

pub mod preview;

use crate::api::MigrationBackend;
use crate::connection::{ConnectionManager, Role};
use crate::error::{ApiError, FetchError};
use crate::task::guarded;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use preview::{build_preview, render_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePreview {
    /// Table the preview belongs to; `None` while idle
    pub table: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
    pub status: PreviewStatus,
    pub error_message: Option<String>,
}

impl TablePreview {
    pub fn idle() -> Self {
        Self {
            table: None,
            columns: Vec::new(),
            rows: Vec::new(),
            status: PreviewStatus::Idle,
            error_message: None,
        }
    }

    fn loading(table: &str) -> Self {
        Self {
            table: Some(table.to_string()),
            status: PreviewStatus::Loading,
            ..Self::idle()
        }
    }

    fn failed(table: &str, message: String) -> Self {
        Self {
            table: Some(table.to_string()),
            status: PreviewStatus::Failed,
            error_message: Some(message),
            ..Self::idle()
        }
    }

    /// Rendered value of `column` in row `row`, `None` if the row lacks it
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }
}

impl Default for TablePreview {
    fn default() -> Self {
        Self::idle()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCatalogEntry {
    pub role: Role,
    /// Unique, in backend order
    pub table_names: Vec<String>,
    pub selected_table: Option<String>,
    pub preview: TablePreview,
    /// Message of the last failed listing, cleared by a successful one
    pub listing_error: Option<String>,
}

impl TableCatalogEntry {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            table_names: Vec::new(),
            selected_table: None,
            preview: TablePreview::idle(),
            listing_error: None,
        }
    }
}

struct Slot {
    entry: TableCatalogEntry,
    epoch: u64,
    selection: u64,
}

pub struct TableCatalog {
    role: Role,
    backend: Arc<dyn MigrationBackend>,
    row_limit: usize,
    slot: Mutex<Slot>,
}

impl TableCatalog {
    pub fn new(role: Role, backend: Arc<dyn MigrationBackend>, row_limit: usize) -> Self {
        Self {
            role,
            backend,
            row_limit,
            slot: Mutex::new(Slot {
                entry: TableCatalogEntry::new(role),
                epoch: 0,
                selection: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn entry(&self) -> TableCatalogEntry {
        self.lock().entry.clone()
    }

    pub fn selected_table(&self) -> Option<String> {
        self.lock().entry.selected_table.clone()
    }

    pub fn preview(&self) -> TablePreview {
        self.lock().entry.preview.clone()
    }

    /// Fetch the table list, replacing the previous one.
    ///
    /// The selection survives unless the selected table disappeared, in which
    /// case selection and preview are reset.
    pub async fn list_tables(
        &self,
        connection: &ConnectionManager,
    ) -> Result<Vec<String>, FetchError> {
        let generation = connection
            .connected_generation()
            .ok_or(FetchError::NotConnected(self.role))?;
        let epoch = self.lock().epoch;

        debug!("Listing tables of {} database", self.role);
        let outcome = guarded(self.backend.list_tables(self.role)).await;

        let mut slot = self.lock();
        if slot.epoch != epoch || connection.connected_generation() != Some(generation) {
            warn!("Discarding table list for {} database: disconnected meanwhile", self.role);
            return Err(FetchError::Superseded(self.role));
        }

        let response = match outcome {
            Ok(response) if response.success => response,
            Ok(response) => {
                let message = response
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| "backend could not list tables".to_string());
                let err = FetchError::Rejected {
                    role: self.role,
                    message,
                };
                return Err(self.listing_failed(&mut slot, err));
            }
            Err(source) => {
                return Err(self.listing_failed(&mut slot, self.backend_error(source)));
            }
        };

        let mut seen = HashSet::new();
        let names: Vec<String> = response
            .tables
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect();

        let dropped = slot
            .entry
            .selected_table
            .take_if(|selected| !names.contains(selected));
        if let Some(selected) = dropped {
            info!(
                "Table '{}' no longer listed for {} database; clearing selection",
                selected, self.role
            );
            slot.entry.preview = TablePreview::idle();
            slot.selection += 1;
        }

        info!("Listed {} tables for {} database", names.len(), self.role);
        slot.entry.table_names = names.clone();
        slot.entry.listing_error = None;
        Ok(names)
    }

    fn listing_failed(&self, slot: &mut Slot, err: FetchError) -> FetchError {
        warn!("{}", err);
        slot.entry.listing_error = Some(err.to_string());
        err
    }

    /// Select `name` and load its preview.
    ///
    /// Only the most recent selection may write the preview; an older fetch
    /// that completes later returns [`FetchError::Superseded`] and leaves the
    /// catalog untouched.
    pub async fn select_table(
        &self,
        connection: &ConnectionManager,
        name: &str,
    ) -> Result<TablePreview, FetchError> {
        let generation = connection
            .connected_generation()
            .ok_or(FetchError::NotConnected(self.role))?;

        let (epoch, ticket) = {
            let mut slot = self.lock();
            if !slot.entry.table_names.iter().any(|table| table == name) {
                return Err(FetchError::UnknownTable {
                    role: self.role,
                    table: name.to_string(),
                });
            }

            slot.selection += 1;
            slot.entry.selected_table = Some(name.to_string());
            slot.entry.preview = TablePreview::loading(name);
            (slot.epoch, slot.selection)
        };

        debug!("Loading preview of {}.{}", self.role, name);
        let outcome = guarded(self.backend.preview_table(self.role, name)).await;

        let result = match outcome {
            Ok(response) if response.success => build_preview(name, response.data, self.row_limit)
                .map_err(|message| FetchError::Malformed { role: self.role, message }),
            Ok(response) => Err(FetchError::Rejected {
                role: self.role,
                message: response
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| format!("backend could not load table '{}'", name)),
            }),
            Err(source) => Err(self.backend_error(source)),
        };

        let mut slot = self.lock();
        if slot.epoch != epoch || connection.connected_generation() != Some(generation) {
            warn!("Discarding preview of {}.{}: disconnected meanwhile", self.role, name);
            return Err(FetchError::Superseded(self.role));
        }
        if slot.selection != ticket {
            debug!("Discarding preview of {}.{}: a newer selection replaced it", self.role, name);
            return Err(FetchError::Superseded(self.role));
        }

        match result {
            Ok(preview) => {
                debug!(
                    "Preview of {}.{} ready: {} columns, {} rows",
                    self.role,
                    name,
                    preview.columns.len(),
                    preview.rows.len()
                );
                slot.entry.preview = preview.clone();
                Ok(preview)
            }
            Err(err) => {
                warn!("{}", err);
                slot.entry.preview = TablePreview::failed(name, err.to_string());
                Err(err)
            }
        }
    }

    /// Forget tables, selection and preview; in-flight results are discarded
    pub fn clear(&self) {
        let mut slot = self.lock();
        slot.epoch += 1;
        slot.selection += 1;
        slot.entry = TableCatalogEntry::new(self.role);
    }

    fn backend_error(&self, source: ApiError) -> FetchError {
        match source.rejection_message() {
            Some(message) => FetchError::Rejected {
                role: self.role,
                message: message.to_string(),
            },
            None => FetchError::Backend { role: self.role, source },
        }
    }
}
