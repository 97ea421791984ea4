//! Registry of context participants.
//!
//! The registry answers one question for snapshotting: which participants
//! must travel with a task. It is a copy-on-write list, so taking a snapshot
//! reads one consistent version of the set while registration swaps in a new
//! one.

use crate::slot::{SlotId, Transmittee};
use crate::snapshot::ContextSnapshot;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

type Participants = Arc<Vec<Arc<dyn Transmittee>>>;

static GLOBAL: OnceLock<ContextRegistry> = OnceLock::new();

/// A set of participants included in snapshots.
///
/// Cloning yields another handle to the same set.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    participants: Arc<RwLock<Participants>>,
}

impl ContextRegistry {
    /// Creates a new, empty, independent registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry, creating it on first use.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// Adds a participant. Returns false if one with the same id is present.
    pub fn register_transmittee(&self, participant: Arc<dyn Transmittee>) -> bool {
        let mut guard = self.participants.write();
        if guard.iter().any(|p| p.id() == participant.id()) {
            return false;
        }

        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        debug!(slot = participant.name(), slot_id = %participant.id(), "Registered context slot");
        next.push(participant);
        *guard = Arc::new(next);
        true
    }

    /// Removes the participant with `id`. Returns false if it was not present.
    pub fn unregister(&self, id: SlotId) -> bool {
        let mut guard = self.participants.write();
        let Some(position) = guard.iter().position(|p| p.id() == id) else {
            return false;
        };

        let mut next: Vec<_> = guard.iter().cloned().collect();
        let removed = next.remove(position);
        *guard = Arc::new(next);
        debug!(slot = removed.name(), slot_id = %id, "Unregistered context slot");
        true
    }

    /// Returns true if a participant with `id` is registered.
    #[must_use]
    pub fn contains(&self, id: SlotId) -> bool {
        self.participants.read().iter().any(|p| p.id() == id)
    }

    /// Returns the number of registered participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.read().is_empty()
    }

    /// Returns the names of registered participants in registration order.
    #[must_use]
    pub fn slot_names(&self) -> Vec<String> {
        self.participants
            .read()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Captures the current thread's state for every registered slot.
    ///
    /// Equivalent to [`ContextSnapshot::capture_from`].
    #[must_use]
    pub fn snapshot_all(&self) -> ContextSnapshot {
        ContextSnapshot::capture_from(self)
    }

    /// Returns one consistent version of the participant list.
    ///
    /// Registrations after this call do not affect the returned list.
    pub(crate) fn participants(&self) -> Participants {
        self.participants.read().clone()
    }
}

impl fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("slots", &self.slot_names())
            .finish()
    }
}
