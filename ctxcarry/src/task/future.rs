//! Context propagation for futures.
//!
//! A future may be polled on a different worker each time it wakes, so the
//! context is installed around every `poll` rather than once. The first poll
//! installs the captured snapshot; every later poll puts back what the future
//! itself left in its slots at the end of the previous poll, so its own
//! writes survive an `.await`.

use crate::registry::ContextRegistry;
use crate::replay::{RestorePolicy, ScopedReplay};
use crate::snapshot::ContextSnapshot;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future that runs as one unit of work under the context captured at
/// construction.
///
/// Dropping it before the first poll never touches any thread's context.
pub struct ContextFuture<F> {
    snapshot: ContextSnapshot,
    suspended: Option<ContextSnapshot>,
    policy: RestorePolicy,
    inner: Pin<Box<F>>,
}

impl<F: Future> ContextFuture<F> {
    /// Wraps `future`, capturing the current thread's global context now.
    pub fn new(future: F) -> Self {
        Self::from_snapshot(ContextSnapshot::capture(), future)
    }

    /// Wraps `future`, capturing the current thread's context for `registry`.
    pub fn with_registry(registry: &ContextRegistry, future: F) -> Self {
        Self::from_snapshot(ContextSnapshot::capture_from(registry), future)
    }

    /// Wraps `future` with an already captured snapshot.
    pub fn from_snapshot(snapshot: ContextSnapshot, future: F) -> Self {
        Self {
            snapshot,
            suspended: None,
            policy: RestorePolicy::default(),
            inner: Box::pin(future),
        }
    }

    /// Sets the restore policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RestorePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the snapshot captured at construction.
    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }
}

impl<F: Future> Future for ContextFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let replay = match this.suspended.take() {
            Some(saved) => ScopedReplay::resume_with(&saved, this.policy),
            None => ScopedReplay::install_with(&this.snapshot, this.policy),
        };

        let poll = this.inner.as_mut().poll(cx);
        if poll.is_pending() {
            this.suspended = Some(replay.suspend());
        } else {
            replay.restore();
        }
        poll
    }
}

impl<F> fmt::Debug for ContextFuture<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextFuture")
            .field("snapshot", &self.snapshot)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Extension methods for binding a future to the current context.
pub trait FutureContextExt: Future + Sized {
    /// Captures the current thread's global context for this future.
    fn with_context(self) -> ContextFuture<Self> {
        ContextFuture::new(self)
    }

    /// Captures the current thread's context for `registry`.
    fn with_context_from(self, registry: &ContextRegistry) -> ContextFuture<Self> {
        ContextFuture::with_registry(registry, self)
    }
}

impl<F: Future> FutureContextExt for F {}
