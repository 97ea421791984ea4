//! Wrapping units of work so they run with a captured context.
//!
//! Capture happens when the wrapper is built, on the thread that builds it.
//! Running the wrapper installs that frozen snapshot around the inner work
//! and restores the running thread's own context afterwards.

mod future;

pub use future::{ContextFuture, FutureContextExt};

use crate::registry::ContextRegistry;
use crate::replay::{RestorePolicy, ScopedReplay};
use crate::snapshot::ContextSnapshot;
use std::fmt;
use std::thread::JoinHandle;

/// A unit of work bound to the context captured when it was wrapped.
///
/// The inner work's return value, `Err` included, is handed back untouched,
/// and a panic keeps unwinding with its original payload after the restore.
///
/// ```rust,ignore
/// CONTEXT.set("init-value".to_string())?;
/// let task = ContextTask::new(|| CONTEXT.get());
/// CONTEXT.set("value-set-in-parent".to_string())?;
///
/// // Wherever it runs, the task sees "init-value".
/// std::thread::spawn(move || task.run());
/// ```
pub struct ContextTask<F> {
    snapshot: ContextSnapshot,
    policy: RestorePolicy,
    work: F,
}

impl<F> ContextTask<F> {
    /// Wraps `work`, capturing the current thread's global context now.
    pub fn new(work: F) -> Self {
        Self::from_snapshot(ContextSnapshot::capture(), work)
    }

    /// Wraps `work`, capturing the current thread's context for `registry`.
    pub fn with_registry(registry: &ContextRegistry, work: F) -> Self {
        Self::from_snapshot(ContextSnapshot::capture_from(registry), work)
    }

    /// Wraps `work` with an already captured snapshot.
    pub fn from_snapshot(snapshot: ContextSnapshot, work: F) -> Self {
        Self {
            snapshot,
            policy: RestorePolicy::default(),
            work,
        }
    }

    /// Sets the restore policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RestorePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the captured snapshot.
    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }

    /// Returns the original, unwrapped work.
    pub fn into_inner(self) -> F {
        self.work
    }
}

impl<F> ContextTask<F> {
    /// Runs the work under the captured context.
    ///
    /// May be called any number of times, from any thread; every run
    /// installs the same snapshot.
    pub fn run<R>(&self) -> R
    where
        F: Fn() -> R,
    {
        let _replay = ScopedReplay::install_with(&self.snapshot, self.policy);
        (self.work)()
    }

    /// Runs the work once under the captured context, consuming the task.
    pub fn run_once<R>(self) -> R
    where
        F: FnOnce() -> R,
    {
        let _replay = ScopedReplay::install_with(&self.snapshot, self.policy);
        (self.work)()
    }
}

impl<F> Clone for ContextTask<F>
where
    F: Clone,
{
    fn clone(&self) -> Self {
        Self {
            snapshot: self.snapshot.clone(),
            policy: self.policy,
            work: self.work.clone(),
        }
    }
}

impl<F> fmt::Debug for ContextTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextTask")
            .field("snapshot", &self.snapshot)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Wraps `work` with the current thread's global context.
pub fn wrap<F>(work: F) -> ContextTask<F> {
    ContextTask::new(work)
}

/// Wraps `work` with the current thread's context for `registry`.
pub fn wrap_with<F>(registry: &ContextRegistry, work: F) -> ContextTask<F> {
    ContextTask::with_registry(registry, work)
}

/// Runs `work` with every globally registered slot absent, then restores.
pub fn run_cleared<F, R>(work: F) -> R
where
    F: FnOnce() -> R,
{
    run_cleared_in(ContextRegistry::global(), work)
}

/// Runs `work` with every slot of `registry` absent, then restores.
pub fn run_cleared_in<F, R>(registry: &ContextRegistry, work: F) -> R
where
    F: FnOnce() -> R,
{
    ContextTask::from_snapshot(ContextSnapshot::empty(registry), work).run_once()
}

/// Spawns an OS thread that starts with the current thread's global context.
pub fn spawn_with_context<F, T>(work: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let task = ContextTask::new(work);
    std::thread::spawn(move || task.run_once())
}
