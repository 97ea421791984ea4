//! Installing a snapshot on the current thread and undoing it.
//!
//! A [`ScopedReplay`] is an RAII guard: creating it saves the thread's own
//! state and installs the snapshot; dropping it (or calling
//! [`ScopedReplay::restore`]) puts the saved state back. Drop also runs while
//! a panic unwinds, so the restore happens on every exit path.
//!
//! Restore always wins: anything the wrapped work wrote to a replayed slot,
//! including `remove()`, is discarded when the guard ends.

mod backup;

use crate::errors::RestoreInvariantViolation;
use crate::snapshot::ContextSnapshot;
use backup::Backup;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::marker::PhantomData;
use tracing::{error, trace};

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// What to do when a backup does not match its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
    /// Log the violation, restore what can be restored, then panic.
    ///
    /// No panic is raised if the thread is already unwinding.
    #[default]
    Strict,
    /// Log the violation and restore what can be restored.
    LogOnly,
}

impl RestorePolicy {
    /// Maps the `strict_restore` configuration flag to a policy.
    #[must_use]
    pub const fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::LogOnly
        }
    }
}

/// A snapshot installed on the current thread, restored exactly once.
///
/// Not `Send`: it must end on the thread that created it. Guards on one
/// thread must end in reverse order of installation; ending an outer guard
/// while an inner one is still active is reported as a restore invariant
/// violation.
#[must_use = "dropping a ScopedReplay restores the previous context immediately"]
pub struct ScopedReplay {
    snapshot: ContextSnapshot,
    backup: Option<Backup>,
    policy: RestorePolicy,
    level: usize,
    _not_send: PhantomData<*const ()>,
}

impl ScopedReplay {
    /// Installs `snapshot` on the current thread with the strict policy.
    pub fn install(snapshot: &ContextSnapshot) -> Self {
        Self::install_with(snapshot, RestorePolicy::default())
    }

    /// Installs `snapshot` on the current thread.
    ///
    /// The thread's own state for every slot in the snapshot is saved before
    /// anything is written. Slots registered after the snapshot was taken
    /// are left alone.
    pub fn install_with(snapshot: &ContextSnapshot, policy: RestorePolicy) -> Self {
        Self::enter(snapshot, policy, false)
    }

    /// Puts back states saved by [`suspend`](Self::suspend), without the
    /// install-time copy.
    pub(crate) fn resume_with(saved: &ContextSnapshot, policy: RestorePolicy) -> Self {
        Self::enter(saved, policy, true)
    }

    fn enter(snapshot: &ContextSnapshot, policy: RestorePolicy, verbatim: bool) -> Self {
        let backup = Backup::take(snapshot);
        let level = DEPTH.with(|d| {
            let next = d.get() + 1;
            d.set(next);
            next
        });

        // Guard exists before the first write so a panicking copy still restores.
        let replay = Self {
            snapshot: snapshot.clone(),
            backup: Some(backup),
            policy,
            level,
            _not_send: PhantomData,
        };

        for entry in snapshot.entries() {
            if verbatim {
                entry.participant.restore(&entry.state);
            } else {
                entry.participant.install(&entry.state);
            }
        }

        trace!(snapshot_id = %snapshot.id(), slots = snapshot.len(), depth = level, "Installed context snapshot");
        replay
    }

    /// Returns the installed snapshot.
    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }

    /// Returns how many replays are active on the current thread.
    #[must_use]
    pub fn depth() -> usize {
        DEPTH.with(Cell::get)
    }

    /// Restores the saved state now instead of at drop.
    pub fn restore(mut self) {
        self.finish();
    }

    /// Reads the current state of the installed slots, then restores.
    ///
    /// The returned snapshot holds what the wrapped work left behind, ready
    /// for [`resume_with`](Self::resume_with).
    pub(crate) fn suspend(mut self) -> ContextSnapshot {
        let saved = self.snapshot.reread();
        self.finish();
        saved
    }

    fn finish(&mut self) {
        let Some(backup) = self.backup.take() else {
            return;
        };

        let active = Self::depth();
        let check = backup.verify(&self.snapshot).and_then(|()| {
            if active == self.level {
                Ok(())
            } else {
                Err(RestoreInvariantViolation::new(
                    self.snapshot.id(),
                    format!(
                        "replay installed at depth {} ended at depth {active}; replays must end in reverse order",
                        self.level
                    ),
                ))
            }
        });
        backup.restore();
        let depth = DEPTH.with(|d| {
            let current = d.get().saturating_sub(1);
            d.set(current);
            current
        });
        trace!(snapshot_id = %self.snapshot.id(), slots = backup.len(), depth, "Restored context");

        if let Err(violation) = check {
            self.report(&violation);
        }
    }

    fn report(&self, violation: &RestoreInvariantViolation) {
        error!(snapshot_id = %violation.snapshot_id, detail = %violation.detail, "Restore invariant violated");
        if self.policy == RestorePolicy::Strict && !std::thread::panicking() {
            panic!("{violation}");
        }
    }
}

impl Drop for ScopedReplay {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for ScopedReplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedReplay")
            .field("snapshot_id", &self.snapshot.id())
            .field("active", &self.backup.is_some())
            .field("policy", &self.policy)
            .field("level", &self.level)
            .finish()
    }
}
