//! Tokio runtime integration.

use super::{ContextPool, Job, WorkerPool};
use crate::errors::PoolError;
use crate::task::ContextFuture;
use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Runs jobs on the runtime's blocking thread pool.
///
/// Tokio accepts a blocking spawn even while the runtime is shutting down
/// and then drops the job unrun, so `execute` cannot report that case. Work
/// submitted through [`ContextPool::submit`] then completes with
/// [`JoinError::Closed`](crate::errors::JoinError::Closed); the worker's
/// context is never touched.
impl WorkerPool for Handle {
    fn execute(&self, job: Job) -> Result<(), PoolError> {
        drop(self.spawn_blocking(job));
        Ok(())
    }
}

impl ContextPool<Handle> {
    /// Spawns `future` on the runtime, bound to the caller's context.
    ///
    /// The snapshot is installed around every poll, whichever worker
    /// performs it.
    pub fn spawn_future<Fut>(&self, future: Fut) -> JoinHandle<Fut::Output>
    where
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let future = ContextFuture::with_registry(self.registry(), future)
            .with_policy(self.config().restore_policy());
        self.inner().spawn(future)
    }
}
