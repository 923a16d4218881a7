use std::future::Future;

use tokio::runtime::Handle;

use crate::error::{OfflineError, OfflineResult};

/// Where index probes run.
///
/// A probe is submitted as a self-contained future and the caller waits for its result.
/// Executors must not swallow [`OfflineError::Interrupted`].
pub trait ProbeExecutor: Send + Sync {
    fn execute<F, T>(&self, work: F) -> impl Future<Output = OfflineResult<T>> + Send
    where
        F: Future<Output = OfflineResult<T>> + Send + 'static,
        T: Send + 'static;
}

/// Runs probes on the task driving the build.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl ProbeExecutor for InlineExecutor {
    fn execute<F, T>(&self, work: F) -> impl Future<Output = OfflineResult<T>> + Send
    where
        F: Future<Output = OfflineResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        work
    }
}

/// Spawns every probe as a tokio task, so that probes of different representations can
/// run in parallel on a multi-threaded runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running on.
    pub fn current() -> OfflineResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| OfflineError::ProbeTask(e.to_string()))
    }
}

impl ProbeExecutor for TokioExecutor {
    fn execute<F, T>(&self, work: F) -> impl Future<Output = OfflineResult<T>> + Send
    where
        F: Future<Output = OfflineResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let task = self.handle.spawn(work);
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(OfflineError::Interrupted),
                Err(e) => Err(OfflineError::ProbeTask(e.to_string())),
            }
        }
    }
}
