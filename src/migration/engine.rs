use super::run::{MigrationHandle, MigrationPhase, MigrationRun};
use crate::api::{MigrationBackend, MigrationRequest, MigrationResponse};
use crate::connection::Role;
use crate::error::{ApiError, MigrationError, ValidationError};
use crate::task::{BackgroundTask, guarded};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const CANCELLED_MESSAGE: &str = "Migration cancelled before the backend finished";

struct EngineState {
    run: Option<MigrationRun>,
    next_id: u64,
    transfer: Option<BackgroundTask>,
    // the backend reported an unfinished transfer since the run started
    backend_active: bool,
}

/// Drives one migration at a time against the backend.
///
/// The transfer itself runs on a background task; callers read counters with
/// [`MigrationEngine::query_progress`] and refresh them from the backend with
/// [`MigrationEngine::refresh_progress`].
pub struct MigrationEngine {
    backend: Arc<dyn MigrationBackend>,
    token: CancellationToken,
    state: Mutex<EngineState>,
    // bumped whenever a run reaches a terminal phase
    finished: watch::Sender<u64>,
}

impl MigrationEngine {
    /// `token` cancels every transfer started by this engine
    pub fn new(backend: Arc<dyn MigrationBackend>, token: CancellationToken) -> Self {
        Self {
            backend,
            token,
            state: Mutex::new(EngineState {
                run: None,
                next_id: 0,
                transfer: None,
                backend_active: false,
            }),
            finished: watch::channel(0).0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a fresh run and return immediately.
    ///
    /// Fails with [`MigrationError::AlreadyInProgress`] while another run is
    /// running; the running one is left untouched.
    pub fn start(
        self: &Arc<Self>,
        source_table: &str,
        target_table: &str,
    ) -> Result<MigrationHandle, MigrationError> {
        let source_table = source_table.trim();
        let target_table = target_table.trim();
        if source_table.is_empty() {
            return Err(ValidationError::EmptyTable(Role::Source).into());
        }
        if target_table.is_empty() {
            return Err(ValidationError::EmptyTable(Role::Target).into());
        }

        let mut state = self.lock();
        if state
            .run
            .as_ref()
            .is_some_and(|run| run.phase == MigrationPhase::Running)
        {
            return Err(MigrationError::AlreadyInProgress);
        }

        state.next_id += 1;
        let run = MigrationRun::running(state.next_id, source_table, target_table);
        let handle = run.handle();
        state.run = Some(run);
        state.backend_active = false;

        let request = MigrationRequest {
            source_table: source_table.to_string(),
            target_table: target_table.to_string(),
        };
        let backend = Arc::clone(&self.backend);
        let engine = Arc::downgrade(self);
        let token = self.token.child_token();
        let cancelled = token.clone();

        info!(
            "Starting migration #{}: {} -> {}",
            handle.id, request.source_table, request.target_table
        );
        state.transfer = Some(BackgroundTask::spawn(token, async move {
            let outcome = tokio::select! {
                _ = cancelled.cancelled() => None,
                outcome = guarded(backend.migrate(&request)) => Some(outcome),
            };
            if let Some(engine) = engine.upgrade() {
                engine.finish(handle, outcome);
            }
        }));

        Ok(handle)
    }

    /// Latest known snapshot of `handle`'s run, including after it ended
    pub fn query_progress(
        &self,
        handle: MigrationHandle,
    ) -> Result<MigrationRun, MigrationError> {
        match &self.lock().run {
            Some(run) if run.id == handle.id => Ok(run.clone()),
            _ => Err(MigrationError::UnknownRun(handle.id)),
        }
    }

    /// Poll the backend's counters and merge them into a running run.
    ///
    /// Terminal runs are returned as they are, without a backend call. The
    /// backend keeps its last counters after a transfer ends, so a finished
    /// report is ignored until the backend has shown this run in progress.
    pub async fn refresh_progress(
        &self,
        handle: MigrationHandle,
    ) -> Result<MigrationRun, MigrationError> {
        let run = self.query_progress(handle)?;
        if run.phase != MigrationPhase::Running {
            return Ok(run);
        }

        let progress = guarded(self.backend.migration_progress())
            .await
            .map_err(MigrationError::Progress)?;

        let mut state = self.lock();
        let state = &mut *state;
        let Some(run) = state.run.as_mut().filter(|run| run.id == handle.id) else {
            return Err(MigrationError::UnknownRun(handle.id));
        };

        if progress.is_complete && !state.backend_active {
            debug!(
                "Migration #{}: ignoring finished counters from an earlier transfer",
                run.id
            );
            return Ok(run.clone());
        }
        state.backend_active |= !progress.is_complete;

        if run.apply_progress(progress.total_records, progress.migrated_records) {
            debug!(
                "Migration #{}: {}/{} records",
                run.id,
                run.migrated_records,
                run.total_records
                    .map_or_else(|| "?".to_string(), |total| total.to_string())
            );
        }
        Ok(run.clone())
    }

    /// Notified each time a run ends, so watchers need not wait for a tick
    pub fn subscribe_finished(&self) -> watch::Receiver<u64> {
        self.finished.subscribe()
    }

    fn notify_finished(&self) {
        self.finished.send_modify(|count| *count += 1);
    }

    /// Snapshot of the most recent run, if any
    pub fn current(&self) -> Option<MigrationRun> {
        self.lock().run.clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .run
            .as_ref()
            .is_some_and(|run| run.phase == MigrationPhase::Running)
    }

    /// Apply the transfer outcome unless the run was replaced or already ended
    fn finish(
        &self,
        handle: MigrationHandle,
        outcome: Option<Result<MigrationResponse, ApiError>>,
    ) {
        {
            let mut state = self.lock();
            let Some(run) = state
                .run
                .as_mut()
                .filter(|run| run.id == handle.id && run.phase == MigrationPhase::Running)
            else {
                debug!("Ignoring outcome of stale migration #{}", handle.id);
                return;
            };

            match outcome {
                Some(Ok(response)) if response.success => {
                    if let Some(migrated) = response.migrated_count {
                        run.apply_progress(response.total_count.unwrap_or(0), migrated);
                    }
                    let message =
                        Some(response.message).filter(|message| !message.trim().is_empty());
                    run.succeed(response.total_count, message);
                    info!(
                        "Migration #{} succeeded: {} records",
                        run.id, run.migrated_records
                    );
                }
                Some(Ok(response)) => {
                    run.apply_progress(
                        response.total_count.unwrap_or(0),
                        response.migrated_count.unwrap_or(0),
                    );
                    let message = if response.message.trim().is_empty() {
                        "Migration failed".to_string()
                    } else {
                        response.message
                    };
                    error!("Migration #{} failed: {}", run.id, message);
                    run.fail(message);
                }
                Some(Err(err)) => {
                    error!("Migration #{} failed: {}", run.id, err);
                    run.fail(format!("Migration failed: {}", err));
                }
                None => {
                    warn!("Migration #{} cancelled", run.id);
                    run.fail(CANCELLED_MESSAGE);
                }
            }
        }
        self.notify_finished();
    }

    /// Stop waiting for the backend; a running run ends as failed
    pub fn shutdown(&self) {
        self.token.cancel();
        let transfer = {
            let mut state = self.lock();
            if let Some(run) = state
                .run
                .as_mut()
                .filter(|run| run.phase == MigrationPhase::Running)
            {
                warn!("Migration #{} interrupted by shutdown", run.id);
                run.fail(CANCELLED_MESSAGE);
            }
            state.transfer.take()
        };
        drop(transfer);
        self.notify_finished();
    }
}
