//! Pool decoration: wrap everything submitted to a worker pool.
//!
//! [`WorkerPool`] is the only thing this crate needs from a pool: run a
//! boxed closure, once, on some thread, eventually. [`ContextPool`] sits in
//! front of one and wraps every submission with the submitter's context at
//! the moment of the call. Scheduling stays entirely with the inner pool.

mod handle;
#[cfg(feature = "tokio-pool")]
mod runtime;

pub use handle::{join_all, TaskHandle};

use crate::config::CarryConfig;
use crate::errors::{CarryError, PoolError};
use crate::errors::PanicPayload;
use crate::observability::{TaskOutcome, TaskSpanAttributes, TaskTimer};
use crate::registry::ContextRegistry;
use crate::task::ContextTask;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{trace, warn};
use uuid::Uuid;

/// A unit of work handed to a worker pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The submission side of a worker pool.
///
/// Implementations must run every accepted job exactly once and may run
/// many jobs on the same thread over time.
#[cfg_attr(test, mockall::automock)]
pub trait WorkerPool: Send + Sync {
    /// Hands `job` to the pool.
    ///
    /// # Errors
    ///
    /// Returns a [`PoolError`] if the pool does not accept the job; the job
    /// is then dropped without running.
    fn execute(&self, job: Job) -> Result<(), PoolError>;
}

impl<P: WorkerPool + ?Sized> WorkerPool for Arc<P> {
    fn execute(&self, job: Job) -> Result<(), PoolError> {
        (**self).execute(job)
    }
}

impl<P: WorkerPool + ?Sized> WorkerPool for Box<P> {
    fn execute(&self, job: Job) -> Result<(), PoolError> {
        (**self).execute(job)
    }
}

impl<P: WorkerPool + ?Sized> WorkerPool for &P {
    fn execute(&self, job: Job) -> Result<(), PoolError> {
        (**self).execute(job)
    }
}

/// A worker pool whose submissions carry the submitter's context.
///
/// ```rust,ignore
/// let pool = ContextPool::new(FixedThreadPool::new(2));
///
/// CONTEXT.set("init-value".to_string())?;
/// let first = pool.submit(|| CONTEXT.get())?;
/// CONTEXT.set("value-set-in-parent".to_string())?;
/// let second = pool.submit(|| CONTEXT.get())?;
///
/// assert_eq!(first.join()?, Some("init-value".to_string()));
/// assert_eq!(second.join()?, Some("value-set-in-parent".to_string()));
/// ```
pub struct ContextPool<P> {
    inner: P,
    registry: ContextRegistry,
    config: CarryConfig,
}

impl<P: WorkerPool> ContextPool<P> {
    /// Decorates `inner` using the global registry and default config.
    pub fn new(inner: P) -> Self {
        Self::with_config(inner, CarryConfig::default())
    }

    /// Decorates `inner` using the global registry and `config`.
    pub fn with_config(inner: P, config: CarryConfig) -> Self {
        Self {
            inner,
            registry: ContextRegistry::global().clone(),
            config,
        }
    }

    /// Captures from `registry` instead of the global registry.
    #[must_use]
    pub fn with_registry(mut self, registry: &ContextRegistry) -> Self {
        self.registry = registry.clone();
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CarryConfig {
        &self.config
    }

    /// Returns the registry submissions capture from.
    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// Returns the undecorated pool.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Removes the decoration, returning the undecorated pool.
    pub fn into_inner(self) -> P {
        self.inner
    }

    /// Wraps `work` with the caller's context without submitting it.
    pub fn wrap<F>(&self, work: F) -> ContextTask<F> {
        ContextTask::with_registry(&self.registry, work).with_policy(self.config.restore_policy())
    }

    /// Submits fire-and-forget work.
    ///
    /// A panic in `work` is logged with its message and then resumed with
    /// the original payload once the worker's context is restored, so the
    /// inner pool sees the failure exactly as it would without decoration.
    ///
    /// # Errors
    ///
    /// Returns [`CarryError::Pool`] if the inner pool refuses the job.
    pub fn execute<F>(&self, work: F) -> Result<(), CarryError>
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.wrap(work);
        let attributes =
            TaskSpanAttributes::new(self.config.pool_name.clone(), task.snapshot().id(), task.snapshot().len());
        let snapshot_id = task.snapshot().id();

        let job: Job = Box::new(move || {
            let timer = TaskTimer::start();
            let result = catch_unwind(AssertUnwindSafe(|| task.run_once()));
            let attributes = attributes.on_worker().with_duration(timer.elapsed());
            match result {
                Ok(()) => attributes.with_outcome(TaskOutcome::Completed).emit(),
                Err(payload) => {
                    let message = PanicPayload::new(payload);
                    attributes.with_panic(message.message()).emit();
                    resume_unwind(message.into_inner());
                }
            }
        });

        self.dispatch(snapshot_id, job)
    }

    /// Submits work and returns a handle to its result.
    ///
    /// With `catch_panics` enabled a panic is reported through the handle as
    /// [`JoinError::Panicked`](crate::errors::JoinError::Panicked); otherwise
    /// it unwinds into the inner pool and the handle reports
    /// [`JoinError::Closed`](crate::errors::JoinError::Closed).
    ///
    /// # Errors
    ///
    /// Returns [`CarryError::Pool`] if the inner pool refuses the job.
    pub fn submit<F, R>(&self, work: F) -> Result<TaskHandle<R>, CarryError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let task = self.wrap(work);
        let attributes =
            TaskSpanAttributes::new(self.config.pool_name.clone(), task.snapshot().id(), task.snapshot().len());
        let snapshot_id = task.snapshot().id();
        let catch_panics = self.config.catch_panics;
        let (sender, receiver) = tokio::sync::oneshot::channel();

        let job: Job = Box::new(move || {
            let timer = TaskTimer::start();
            // The replay has already been restored by the time a result or
            // panic reaches this point.
            let result = catch_unwind(AssertUnwindSafe(|| task.run_once()));
            let attributes = attributes.on_worker().with_duration(timer.elapsed());
            match result {
                Ok(value) => {
                    attributes.with_outcome(TaskOutcome::Completed).emit();
                    let _ = sender.send(Ok(value));
                }
                Err(payload) => {
                    let message = PanicPayload::new(payload);
                    attributes.with_panic(message.message()).emit();
                    if catch_panics {
                        let _ = sender.send(Err(message.into_inner()));
                    } else {
                        drop(sender);
                        resume_unwind(message.into_inner());
                    }
                }
            }
        });

        self.dispatch(snapshot_id, job)?;
        Ok(TaskHandle::new(snapshot_id, receiver))
    }

    /// Submits every item of `works`, each wrapped with the context current
    /// at the moment it is submitted.
    ///
    /// # Errors
    ///
    /// Stops at the first refused job and returns its error; jobs accepted
    /// before it keep running.
    pub fn submit_all<I, F, R>(&self, works: I) -> Result<Vec<TaskHandle<R>>, CarryError>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        works.into_iter().map(|work| self.submit(work)).collect()
    }

    fn dispatch(&self, snapshot_id: Uuid, job: Job) -> Result<(), CarryError> {
        match self.inner.execute(job) {
            Ok(()) => {
                trace!(pool = %self.config.pool_name, %snapshot_id, "Submitted wrapped task");
                Ok(())
            }
            Err(e) => {
                warn!(pool = %self.config.pool_name, %snapshot_id, error = %e, "Pool refused wrapped task");
                Err(e.into())
            }
        }
    }
}

impl<P: WorkerPool> WorkerPool for ContextPool<P> {
    fn execute(&self, job: Job) -> Result<(), PoolError> {
        let task = self.wrap(job);
        self.inner.execute(Box::new(move || task.run_once()))
    }
}

impl<P> std::fmt::Debug for ContextPool<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPool")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::JoinError;
    use crate::slot::ContextSlot;
    use crate::testing::RecordingPool;
    use pretty_assertions::assert_eq;

    fn setup() -> (ContextRegistry, ContextSlot<String>) {
        let registry = ContextRegistry::new();
        let slot = ContextSlot::builder("context").register_in(&registry);
        (registry, slot)
    }

    #[test]
    fn test_submit_captures_at_submission() {
        let (registry, slot) = setup();
        let pool = ContextPool::new(RecordingPool::new()).with_registry(&registry);

        slot.set("init-value".to_string()).unwrap();
        let reader = slot.clone();
        let first = pool.submit(move || reader.get()).unwrap();

        slot.set("value-set-in-parent".to_string()).unwrap();
        let reader = slot.clone();
        let second = pool.submit(move || reader.get()).unwrap();

        // Nothing has run yet; run both later, in reverse order.
        pool.inner().run_reversed();

        assert_eq!(first.join().unwrap(), Some("init-value".to_string()));
        assert_eq!(second.join().unwrap(), Some("value-set-in-parent".to_string()));
        assert_eq!(slot.get(), Some("value-set-in-parent".to_string()));
    }

    #[test]
    fn test_submit_reports_panic_and_restores() {
        let (registry, slot) = setup();
        let pool = ContextPool::new(RecordingPool::new()).with_registry(&registry);

        slot.set("submitted".to_string()).unwrap();
        let handle = pool.submit(|| -> u32 { panic!("task failed") }).unwrap();
        slot.set("runner".to_string()).unwrap();

        pool.inner().run_all();

        let err = handle.join().unwrap_err();
        assert_eq!(err.to_string(), "Task panicked: task failed");
        assert_eq!(slot.get(), Some("runner".to_string()));
    }

    #[test]
    fn test_submit_err_value_is_verbatim() {
        let (registry, _slot) = setup();
        let pool = ContextPool::new(RecordingPool::new()).with_registry(&registry);

        let handle = pool
            .submit(|| -> Result<(), std::io::Error> {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
            })
            .unwrap();
        pool.inner().run_all();

        let inner = handle.join().unwrap().unwrap_err();
        assert_eq!(inner.kind(), std::io::ErrorKind::NotFound);
        assert_eq!(inner.to_string(), "missing");
    }

    #[test]
    fn test_refused_job_surfaces_pool_error() {
        let mut mock = MockWorkerPool::new();
        mock.expect_execute()
            .times(1)
            .returning(|_job| Err(PoolError::shutdown("mock")));

        let pool = ContextPool::new(mock).with_registry(&ContextRegistry::new());
        let err = pool.submit(|| 1).unwrap_err();

        assert!(matches!(err, CarryError::Pool(PoolError::Shutdown { .. })));
    }

    #[test]
    fn test_mock_pool_runs_wrapped_job() {
        let (registry, slot) = setup();
        let mut mock = MockWorkerPool::new();
        mock.expect_execute().times(1).returning(|job| {
            std::thread::spawn(job).join().unwrap();
            Ok(())
        });

        let pool = ContextPool::new(mock).with_registry(&registry);
        slot.set("from-submitter".to_string()).unwrap();
        let reader = slot.clone();
        let handle = pool.submit(move || reader.get()).unwrap();

        assert_eq!(handle.join().unwrap(), Some("from-submitter".to_string()));
    }

    #[test]
    fn test_execute_fire_and_forget() {
        let (registry, slot) = setup();
        let pool = ContextPool::new(RecordingPool::new()).with_registry(&registry);
        let seen = Arc::new(parking_lot::Mutex::new(None));

        slot.set("ff".to_string()).unwrap();
        let reader = slot.clone();
        let sink = seen.clone();
        pool.execute(move || *sink.lock() = reader.get()).unwrap();
        slot.remove();

        pool.inner().run_all();
        assert_eq!(seen.lock().clone(), Some("ff".to_string()));
        assert!(!slot.is_present());
    }

    #[test]
    fn test_execute_panic_reaches_inner_pool_after_restore() {
        let (registry, slot) = setup();
        let pool = ContextPool::new(RecordingPool::new()).with_registry(&registry);

        slot.set("submitted".to_string()).unwrap();
        pool.execute(|| panic!("diagnostic detail")).unwrap();
        slot.set("runner".to_string()).unwrap();

        let caught = catch_unwind(AssertUnwindSafe(|| pool.inner().run_all()));
        let payload = caught.unwrap_err();
        assert_eq!(PanicPayload::new(payload).message(), Some("diagnostic detail"));
        assert_eq!(slot.get(), Some("runner".to_string()));
        assert_eq!(crate::replay::ScopedReplay::depth(), 0);
    }

    #[test]
    fn test_submit_without_catching_unwinds_into_pool() {
        let (registry, slot) = setup();
        let config = CarryConfig::default().with_catch_panics(false);
        let pool = ContextPool::with_config(RecordingPool::new(), config).with_registry(&registry);

        slot.set("runner".to_string()).unwrap();
        let handle = pool.submit(|| -> u8 { panic!("uncaught") }).unwrap();

        assert!(catch_unwind(AssertUnwindSafe(|| pool.inner().run_all())).is_err());
        assert!(matches!(handle.join(), Err(JoinError::Closed)));
        assert_eq!(slot.get(), Some("runner".to_string()));
    }

    #[test]
    fn test_discarded_task_never_touches_context() {
        let (registry, slot) = setup();
        let pool = ContextPool::new(RecordingPool::new()).with_registry(&registry);

        slot.set("submitted".to_string()).unwrap();
        let reader = slot.clone();
        let handle = pool.submit(move || reader.get()).unwrap();

        assert_eq!(pool.inner().discard(), 1);
        assert!(matches!(handle.join(), Err(JoinError::Closed)));
        assert_eq!(slot.get(), Some("submitted".to_string()));
        assert_eq!(crate::replay::ScopedReplay::depth(), 0);
    }

    #[test]
    fn test_submit_all_captures_each_in_turn() {
        let (registry, slot) = setup();
        let pool = ContextPool::new(RecordingPool::new()).with_registry(&registry);

        slot.set("only".to_string()).unwrap();
        let works: Vec<_> = (0..3)
            .map(|i| {
                let reader = slot.clone();
                move || (i, reader.get())
            })
            .collect();
        let handles = pool.submit_all(works).unwrap();
        slot.remove();
        pool.inner().run_all();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(
            results,
            vec![
                (0, Some("only".to_string())),
                (1, Some("only".to_string())),
                (2, Some("only".to_string())),
            ]
        );
    }

    #[test]
    fn test_context_pool_is_a_worker_pool() {
        let (registry, slot) = setup();
        let pool = ContextPool::new(RecordingPool::new()).with_registry(&registry);
        let seen = Arc::new(parking_lot::Mutex::new(None));

        slot.set("raw".to_string()).unwrap();
        let reader = slot.clone();
        let sink = seen.clone();
        WorkerPool::execute(&pool, Box::new(move || *sink.lock() = reader.get())).unwrap();
        slot.remove();

        pool.inner().run_all();
        assert_eq!(seen.lock().clone(), Some("raw".to_string()));
    }

    #[test]
    fn test_into_inner_unwraps() {
        let pool = ContextPool::new(RecordingPool::new());
        let inner = pool.into_inner();
        assert_eq!(inner.pending(), 0);
    }
}
