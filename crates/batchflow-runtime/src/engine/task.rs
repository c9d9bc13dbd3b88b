//! Task executors for concurrent branches.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Semaphore, oneshot};

use super::EngineConfig;
use crate::error::{FlowError, FlowResult};

/// Completion handle of a submitted task.
///
/// Resolves once the task finished, or with an error if it panicked or was
/// aborted.
pub type TaskHandle = BoxFuture<'static, FlowResult<()>>;

/// Facility that runs split branches and partitions.
///
/// Every submitted task is expected to make progress independently of the
/// caller; the caller joins on the returned handles.
pub trait TaskExecutor: Send + Sync + fmt::Debug {
    /// Submits a task for execution.
    fn submit(&self, task: BoxFuture<'static, ()>) -> TaskHandle;
}

/// Task executor spawning every task on the tokio runtime.
///
/// An optional limit bounds how many submitted tasks run at once. Nested
/// splits draw from the same limit, so it has to exceed the number of
/// branches that may wait on nested branches at the same time.
#[derive(Debug, Clone, Default)]
pub struct TokioTaskExecutor {
    limit: Option<Arc<Semaphore>>,
}

impl TokioTaskExecutor {
    /// Creates an executor without a concurrency limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor running at most `max_concurrent` tasks at once.
    pub fn bounded(max_concurrent: usize) -> Self {
        Self {
            limit: Some(Arc::new(Semaphore::new(max_concurrent.max(1)))),
        }
    }

    /// Creates an executor bounded by the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::bounded(config.max_concurrent_branches)
    }
}

impl TaskExecutor for TokioTaskExecutor {
    fn submit(&self, task: BoxFuture<'static, ()>) -> TaskHandle {
        let limit = self.limit.clone();
        let handle = tokio::spawn(async move {
            let _permit = match limit {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            task.await;
        });

        Box::pin(async move {
            handle.await.map_err(|e| {
                if e.is_panic() {
                    FlowError::BranchPanicked(e.to_string())
                } else {
                    FlowError::Interrupted(e.to_string())
                }
            })
        })
    }
}

/// Task executor running each task on the caller when its handle is awaited.
///
/// Branches run one after the other in join order, which makes split
/// behavior deterministic in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncTaskExecutor;

impl TaskExecutor for SyncTaskExecutor {
    fn submit(&self, task: BoxFuture<'static, ()>) -> TaskHandle {
        Box::pin(async move {
            AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|_| FlowError::BranchPanicked("task panicked".into()))
        })
    }
}

/// Submits `future` and returns a handle resolving to its output.
pub(crate) fn submit<T, F>(executor: &dyn TaskExecutor, future: F) -> BoxFuture<'static, FlowResult<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let handle = executor.submit(Box::pin(async move {
        let _ = tx.send(future.await);
    }));

    Box::pin(async move {
        handle.await?;
        rx.await
            .map_err(|_| FlowError::Interrupted("task finished without a result".into()))
    })
}
