//! Immutable point-in-time captures of context.

use crate::registry::ContextRegistry;
use crate::slot::{SlotId, SlotState, Transmittee};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

/// One captured participant.
#[derive(Clone)]
pub(crate) struct CapturedEntry {
    pub(crate) participant: Arc<dyn Transmittee>,
    pub(crate) state: SlotState,
}

struct SnapshotInner {
    id: Uuid,
    captured_at: DateTime<Utc>,
    entries: Vec<CapturedEntry>,
}

/// The context of one thread, frozen at the moment of capture.
///
/// A snapshot never changes after construction; later writes on the
/// capturing thread are not reflected. Clones share the same capture.
#[derive(Clone)]
pub struct ContextSnapshot {
    inner: Arc<SnapshotInner>,
}

impl ContextSnapshot {
    /// Captures the current thread's state for every globally registered slot.
    #[must_use]
    pub fn capture() -> Self {
        Self::capture_from(ContextRegistry::global())
    }

    /// Captures the current thread's state for every slot in `registry`.
    #[must_use]
    pub fn capture_from(registry: &ContextRegistry) -> Self {
        let participants = registry.participants();
        let entries = participants
            .iter()
            .map(|participant| CapturedEntry {
                participant: participant.clone(),
                state: participant.capture(),
            })
            .collect();
        Self::from_entries(entries)
    }

    /// Builds a snapshot in which every slot of `registry` is absent.
    #[must_use]
    pub fn empty(registry: &ContextRegistry) -> Self {
        let entries = registry
            .participants()
            .iter()
            .map(|participant| CapturedEntry {
                participant: participant.clone(),
                state: SlotState::Absent,
            })
            .collect();
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<CapturedEntry>) -> Self {
        let snapshot = Self {
            inner: Arc::new(SnapshotInner {
                id: Uuid::new_v4(),
                captured_at: Utc::now(),
                entries,
            }),
        };
        trace!(snapshot_id = %snapshot.id(), slots = snapshot.len(), "Captured context snapshot");
        snapshot
    }

    /// Returns the snapshot's unique id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns when the snapshot was taken.
    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.inner.captured_at
    }

    /// Returns the number of captured slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns true if no slots were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Returns true if the slot with `id` was captured, present or absent.
    #[must_use]
    pub fn contains(&self, id: SlotId) -> bool {
        self.state(id).is_some()
    }

    /// Returns true if the slot with `id` was captured with a value.
    #[must_use]
    pub fn is_present(&self, id: SlotId) -> bool {
        self.state(id).is_some_and(SlotState::is_present)
    }

    /// Returns the captured state of the slot with `id`.
    #[must_use]
    pub fn state(&self, id: SlotId) -> Option<&SlotState> {
        self.inner
            .entries
            .iter()
            .find(|entry| entry.participant.id() == id)
            .map(|entry| &entry.state)
    }

    /// Returns the captured value of slot `id` as `T`.
    #[must_use]
    pub fn value<T: 'static>(&self, id: SlotId) -> Option<&T> {
        self.state(id).and_then(SlotState::downcast_ref::<T>)
    }

    /// Reads the current thread's raw state for exactly this snapshot's
    /// slots, without capture copies.
    pub(crate) fn reread(&self) -> Self {
        let entries = self
            .inner
            .entries
            .iter()
            .map(|entry| CapturedEntry {
                participant: entry.participant.clone(),
                state: entry.participant.backup(),
            })
            .collect();
        Self::from_entries(entries)
    }

    pub(crate) fn entries(&self) -> &[CapturedEntry] {
        &self.inner.entries
    }
}

impl fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<_> = self
            .inner
            .entries
            .iter()
            .map(|entry| (entry.participant.name().to_string(), entry.state.is_present()))
            .collect();
        f.debug_struct("ContextSnapshot")
            .field("id", &self.inner.id)
            .field("captured_at", &self.inner.captured_at)
            .field("slots", &slots)
            .finish()
    }
}
