//! Test assertions for slots and snapshots.

use crate::registry::ContextRegistry;
use crate::slot::ContextSlot;
use crate::snapshot::ContextSnapshot;
use std::fmt::Debug;

/// Asserts that `slot` has no value on the current thread.
pub fn assert_absent<T>(slot: &ContextSlot<T>)
where
    T: Clone + Debug + Send + Sync + 'static,
{
    assert!(
        !slot.is_present(),
        "Expected slot '{}' to be absent, found {:?}",
        slot.name(),
        slot.with(|v| v.cloned())
    );
}

/// Asserts that `slot` holds `expected` on the current thread.
pub fn assert_value<T>(slot: &ContextSlot<T>, expected: &T)
where
    T: Clone + Debug + PartialEq + Send + Sync + 'static,
{
    slot.with(|actual| {
        assert_eq!(
            actual,
            Some(expected),
            "Expected slot '{}' to hold {:?}, got {:?}",
            slot.name(),
            expected,
            actual
        );
    });
}

/// Asserts that no slot of `registry` has a value on the current thread.
pub fn assert_no_context(registry: &ContextRegistry) {
    let snapshot = ContextSnapshot::capture_from(registry);
    let present: Vec<&str> = snapshot
        .entries()
        .iter()
        .filter(|entry| entry.state.is_present())
        .map(|entry| entry.participant.name())
        .collect();
    assert!(
        present.is_empty(),
        "Expected a clean thread, but these slots hold values: {present:?}"
    );
}

/// Asserts that `snapshot` captured `expected` for `slot`.
pub fn assert_snapshot_value<T>(snapshot: &ContextSnapshot, slot: &ContextSlot<T>, expected: &T)
where
    T: Clone + Debug + PartialEq + Send + Sync + 'static,
{
    let actual = snapshot.value::<T>(slot.id());
    assert_eq!(
        actual,
        Some(expected),
        "Expected snapshot {} to hold {:?} for slot '{}', got {:?}",
        snapshot.id(),
        expected,
        slot.name(),
        actual
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertions_pass_on_matching_state() {
        let registry = ContextRegistry::new();
        let slot: ContextSlot<i32> = ContextSlot::builder("n").register_in(&registry);

        assert_absent(&slot);
        assert_no_context(&registry);

        slot.set(5).unwrap();
        assert_value(&slot, &5);
        assert_snapshot_value(&ContextSnapshot::capture_from(&registry), &slot, &5);
        slot.remove();
    }

    #[test]
    #[should_panic(expected = "these slots hold values")]
    fn test_assert_no_context_reports_leaks() {
        let registry = ContextRegistry::new();
        let slot: ContextSlot<i32> = ContextSlot::builder("leaky").register_in(&registry);
        slot.set(1).unwrap();
        assert_no_context(&registry);
    }
}
