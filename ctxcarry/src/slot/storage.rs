//! Thread-local backing store for slot values.
//!
//! Each thread owns one map from slot id to value, so reads and writes never
//! contend with other threads. Old values are dropped after the map borrow is
//! released, which keeps `Drop` impls free to touch other slots.

use super::SlotId;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static VALUES: RefCell<HashMap<SlotId, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Runs `f` with a borrow of the current thread's value for `id`.
///
/// `f` must not write to any slot.
pub(crate) fn with_value<T: Any, R>(id: SlotId, f: impl FnOnce(Option<&T>) -> R) -> R {
    VALUES.with(|values| {
        let values = values.borrow();
        f(values.get(&id).and_then(|v| v.downcast_ref::<T>()))
    })
}

/// Returns true if the current thread holds a value for `id`.
pub(crate) fn contains(id: SlotId) -> bool {
    VALUES.with(|values| values.borrow().contains_key(&id))
}

/// Stores `value` for `id` on the current thread.
pub(crate) fn store<T: Any>(id: SlotId, value: T) {
    let previous = VALUES.with(|values| values.borrow_mut().insert(id, Box::new(value)));
    drop(previous);
}

/// Clears the value for `id` on the current thread. Returns true if one was held.
pub(crate) fn clear(id: SlotId) -> bool {
    let previous = VALUES.with(|values| values.borrow_mut().remove(&id));
    previous.is_some()
}

/// Returns the number of slots holding a value on the current thread.
#[cfg(test)]
pub(crate) fn len() -> usize {
    VALUES.with(|values| values.borrow().len())
}
