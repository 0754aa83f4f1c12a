use super::engine::MigrationEngine;
use super::run::{MigrationHandle, MigrationRun};
use crate::error::MigrationError;
use crate::task::BackgroundTask;
use log::{debug, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Polls a [`MigrationEngine`] on a fixed interval while a run is running.
///
/// At most one subscription is active: watching a new run cancels the
/// previous subscription first.
pub struct ProgressTracker {
    engine: Arc<MigrationEngine>,
    token: CancellationToken,
    active: Mutex<Option<CancellationToken>>,
}

impl ProgressTracker {
    /// `token` cancels every subscription created by this tracker
    pub fn new(engine: Arc<MigrationEngine>, token: CancellationToken) -> Self {
        Self {
            engine,
            token,
            active: Mutex::new(None),
        }
    }

    pub fn watch(
        &self,
        handle: MigrationHandle,
        interval: Duration,
    ) -> Result<ProgressSubscription, MigrationError> {
        let initial = self.engine.query_progress(handle)?;
        let (sender, receiver) = watch::channel(initial);
        let token = self.token.child_token();

        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = active.replace(token.clone()) {
                debug!("Cancelling previous progress subscription");
                previous.cancel();
            }
        }

        let interval = interval.max(Duration::from_millis(1));
        debug!("Watching migration #{} every {:?}", handle.id, interval);
        let task = BackgroundTask::spawn(
            token.clone(),
            poll(Arc::clone(&self.engine), handle, interval, token, sender),
        );

        Ok(ProgressSubscription { handle, receiver, task })
    }

    /// Stop the active subscription, if any
    pub fn cancel(&self) {
        if let Some(token) = self.active.lock().unwrap_or_else(PoisonError::into_inner).take() {
            token.cancel();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

async fn poll(
    engine: Arc<MigrationEngine>,
    handle: MigrationHandle,
    interval: Duration,
    token: CancellationToken,
    sender: watch::Sender<MigrationRun>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut finished = engine.subscribe_finished();

    loop {
        let polled = tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    polled = engine.refresh_progress(handle) => polled,
                }
            }
            // a run ending between ticks is published without a backend call
            Ok(()) = finished.changed() => engine.query_progress(handle),
        };

        let run = match polled {
            Ok(run) => run,
            Err(MigrationError::UnknownRun(_)) => {
                debug!("Migration #{} replaced; stopping progress polling", handle.id);
                break;
            }
            Err(err) => {
                warn!("Progress poll for migration #{} failed, retrying: {}", handle.id, err);
                continue;
            }
        };

        let terminal = run.phase.is_terminal();
        sender.send_if_modified(|current| {
            if *current == run {
                false
            } else {
                *current = run;
                true
            }
        });

        if terminal {
            debug!("Migration #{} ended; stopping progress polling", handle.id);
            break;
        }
    }

    token.cancel();
}

/// Live view of one run's progress; dropping it stops the polling task
pub struct ProgressSubscription {
    handle: MigrationHandle,
    receiver: watch::Receiver<MigrationRun>,
    task: BackgroundTask,
}

impl ProgressSubscription {
    pub fn handle(&self) -> MigrationHandle {
        self.handle
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> MigrationRun {
        self.receiver.borrow().clone()
    }

    /// Wait for the next published snapshot; `None` once polling stopped
    pub async fn changed(&mut self) -> Option<MigrationRun> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until a terminal snapshot is published, or polling stops
    pub async fn wait_for_terminal(&mut self) -> MigrationRun {
        let _ = self.receiver.wait_for(|run| run.phase.is_terminal()).await;
        self.latest()
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// An independent receiver of the same snapshots
    pub fn receiver(&self) -> watch::Receiver<MigrationRun> {
        self.receiver.clone()
    }
}

impl std::fmt::Debug for ProgressSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSubscription")
            .field("handle", &self.handle)
            .field("latest", &*self.receiver.borrow())
            .finish()
    }
}
