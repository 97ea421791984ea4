//! Context slots: named, typed pieces of per-thread context state.
//!
//! This module provides:
//! - `ContextSlot`, the typed handle callers read and write
//! - `SlotOptions` for defaults, validation and copy policies
//! - `Transmittee`, the seam every participant in capture/replay implements

mod context_slot;
mod options;
pub(crate) mod storage;
mod transmittee;

pub use context_slot::{ContextSlot, SlotBuilder};
pub use options::SlotOptions;
pub use transmittee::{SlotId, SlotState, Transmittee};
