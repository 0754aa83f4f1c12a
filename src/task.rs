//! Background task plumbing shared by the engine and the progress tracker

use crate::error::ApiError;
use futures::FutureExt;
use log::error;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Await a backend call, turning a panic inside it into an [`ApiError`]
pub(crate) async fn guarded<F, T>(future: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Backend call panicked: {}", message);
            Err(ApiError::Panicked(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A spawned task tied to a cancellation token.
///
/// Dropping the value cancels the token and aborts the task, so no callback
/// outlives its owner.
#[derive(Debug)]
pub(crate) struct BackgroundTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    pub(crate) fn spawn<F>(token: CancellationToken, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            token,
            handle: tokio::spawn(future),
        }
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guarded_converts_panics() {
        let result: Result<(), ApiError> = guarded(async {
            if true {
                panic!("driver exploded");
            }
            Ok(())
        })
        .await;
        match result {
            Err(ApiError::Panicked(message)) => assert_eq!(message, "driver exploded"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drop_cancels_task() {
        let token = CancellationToken::new();
        let observer = token.clone();
        let task = BackgroundTask::spawn(token.clone(), async move {
            token.cancelled().await;
        });

        drop(task);
        tokio::time::timeout(Duration::from_secs(1), observer.cancelled())
            .await
            .expect("token cancelled on drop");
    }
}
