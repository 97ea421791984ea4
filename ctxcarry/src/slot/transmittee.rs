//! Slot identity, captured state, and the participant trait.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a context slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(u64);

impl SlotId {
    /// Allocates a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates an id from a raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// The state of one slot on one thread: absent, or present with a value.
///
/// `Absent` is distinct from a present value equal to the slot's default.
#[derive(Clone, Default)]
pub enum SlotState {
    /// Nothing is stored.
    #[default]
    Absent,
    /// A value is stored.
    Present(Arc<dyn Any + Send + Sync>),
}

impl SlotState {
    /// Creates a present state holding `value`.
    #[must_use]
    pub fn present<T: Any + Send + Sync>(value: T) -> Self {
        Self::Present(Arc::new(value))
    }

    /// Returns true if a value is stored.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Borrows the stored value as `T`.
    ///
    /// Returns `None` when absent or when the value has another type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Absent => None,
            Self::Present(value) => value.downcast_ref::<T>(),
        }
    }
}

impl fmt::Debug for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Present(_) => f.write_str("Present(..)"),
        }
    }
}

/// A participant in capture, install and restore.
///
/// [`ContextSlot`](super::ContextSlot) is the standard implementation. Other
/// per-thread state (an existing `thread_local!`, a logging MDC) can take
/// part by implementing this trait and registering through
/// [`ContextRegistry::register_transmittee`](crate::registry::ContextRegistry::register_transmittee).
///
/// Every method acts on the calling thread only.
pub trait Transmittee: Send + Sync {
    /// Returns the participant's identity.
    fn id(&self) -> SlotId;

    /// Returns a human-readable name for logs.
    fn name(&self) -> &str;

    /// Reads the current state for a snapshot, applying any capture-time copy.
    fn capture(&self) -> SlotState;

    /// Reads the current state verbatim, for a replay backup.
    fn backup(&self) -> SlotState;

    /// Installs a captured state, applying any install-time copy.
    fn install(&self, state: &SlotState);

    /// Puts a backup back exactly as it was read.
    fn restore(&self, state: &SlotState);
}
