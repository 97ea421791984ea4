//! The typed context slot handle.

use super::options::SlotOptions;
use super::storage;
use super::{SlotId, SlotState, Transmittee};
use crate::errors::{CarryError, ValidationRejectedError};
use crate::registry::ContextRegistry;
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

/// Shared state behind every handle of one slot.
struct SlotInner<T> {
    id: SlotId,
    name: String,
    options: SlotOptions<T>,
}

/// A named, typed piece of context that travels with wrapped tasks.
///
/// Each thread sees its own value. A slot registered in a
/// [`ContextRegistry`] is included in every snapshot taken from that registry
/// afterwards, so wrapped work sees the value the submitting thread held at
/// wrap time.
///
/// Handles are cheap to clone and share identity.
///
/// ```rust,ignore
/// let request_id = ContextSlot::<String>::new("request_id");
/// request_id.set("req-42".to_string())?;
///
/// let task = ctxcarry::wrap(move || request_id.get());
/// std::thread::spawn(move || task.run()).join(); // Some("req-42")
/// ```
pub struct ContextSlot<T> {
    inner: Arc<SlotInner<T>>,
    registry: ContextRegistry,
}

impl<T> ContextSlot<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a slot with no policies and registers it globally.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, SlotOptions::new())
    }

    /// Creates a slot with `options` and registers it globally.
    #[must_use]
    pub fn with_options(name: impl Into<String>, options: SlotOptions<T>) -> Self {
        Self::create(name.into(), options, ContextRegistry::global().clone())
    }

    /// Starts building a slot.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SlotBuilder<T> {
        SlotBuilder::new(name)
    }

    fn create(name: String, options: SlotOptions<T>, registry: ContextRegistry) -> Self {
        let inner = Arc::new(SlotInner {
            id: SlotId::next(),
            name,
            options,
        });
        let slot = Self { inner, registry };
        slot.register();
        slot
    }

    /// Returns the slot's identity.
    #[must_use]
    pub fn id(&self) -> SlotId {
        self.inner.id
    }

    /// Returns the slot's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the registry this slot belongs to.
    #[must_use]
    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// Returns the current thread's value, or the default when absent.
    ///
    /// `None` means absent with no declared default.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        let stored = storage::with_value::<T, _>(self.inner.id, |v| v.cloned());
        stored.or_else(|| self.inner.options.default.as_ref().map(|default| default()))
    }

    /// Borrows the stored value without cloning. Defaults are not consulted.
    ///
    /// `f` must not write to any slot.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        storage::with_value::<T, _>(self.inner.id, f)
    }

    /// Returns true if the current thread holds a value, as opposed to absent.
    #[must_use]
    pub fn is_present(&self) -> bool {
        storage::contains(self.inner.id)
    }

    /// Replaces the current thread's value.
    ///
    /// # Errors
    ///
    /// Returns [`CarryError::ValidationRejected`] if the slot's validator
    /// rejects `value`. The stored state is left unchanged.
    pub fn set(&self, value: T) -> Result<(), CarryError> {
        if let Err(reason) = self.inner.options.validate(&value) {
            warn!(slot = %self.inner.name, slot_id = %self.inner.id, %reason, "Slot value rejected");
            return Err(ValidationRejectedError::new(&self.inner.name, self.inner.id, reason).into());
        }
        storage::store(self.inner.id, value);
        Ok(())
    }

    /// Makes the current thread's state absent.
    ///
    /// Unlike `set(default)`, this leaves [`is_present`](Self::is_present)
    /// false.
    pub fn remove(&self) {
        storage::clear(self.inner.id);
    }

    /// Adds the slot to its registry. Returns false if it was already there.
    pub fn register(&self) -> bool {
        let participant: Arc<dyn Transmittee> = self.inner.clone();
        self.registry.register_transmittee(participant)
    }

    /// Removes the slot from future snapshots. Returns false if it was not
    /// registered.
    ///
    /// Values already stored and snapshots already taken are unaffected.
    pub fn unregister(&self) -> bool {
        self.registry.unregister(self.inner.id)
    }

    /// Returns true if the slot is currently registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registry.contains(self.inner.id)
    }
}

impl<T> Clone for ContextSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<T> fmt::Debug for ContextSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSlot")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("options", &self.inner.options)
            .finish()
    }
}

impl<T> Transmittee for SlotInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> SlotId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&self) -> SlotState {
        // Copy runs outside the storage borrow.
        match storage::with_value::<T, _>(self.id, |v| v.cloned()) {
            Some(value) => SlotState::present(self.options.copy_for_capture(value)),
            None => SlotState::Absent,
        }
    }

    fn backup(&self) -> SlotState {
        storage::with_value::<T, _>(self.id, |v| v.cloned()).map_or(SlotState::Absent, SlotState::present)
    }

    fn install(&self, state: &SlotState) {
        match state {
            SlotState::Absent => {
                storage::clear(self.id);
            }
            SlotState::Present(_) => match state.downcast_ref::<T>() {
                Some(value) => storage::store(self.id, self.options.copy_for_install(value)),
                None => error!(slot = %self.name, slot_id = %self.id, "Captured value has the wrong type"),
            },
        }
    }

    fn restore(&self, state: &SlotState) {
        match state {
            SlotState::Absent => {
                storage::clear(self.id);
            }
            SlotState::Present(_) => match state.downcast_ref::<T>() {
                Some(value) => storage::store(self.id, value.clone()),
                None => error!(slot = %self.name, slot_id = %self.id, "Backup value has the wrong type"),
            },
        }
    }
}

/// Builder for [`ContextSlot`].
pub struct SlotBuilder<T> {
    name: String,
    options: SlotOptions<T>,
}

impl<T> SlotBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a builder for a slot named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: SlotOptions::new(),
        }
    }

    /// Sets a fixed default value.
    #[must_use]
    pub fn default_value(mut self, value: T) -> Self {
        self.options = self.options.with_default(move || value.clone());
        self
    }

    /// Sets a default value factory.
    #[must_use]
    pub fn default_with<F>(mut self, default: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.options = self.options.with_default(default);
        self
    }

    /// Sets the validator run on every `set`.
    #[must_use]
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    {
        self.options = self.options.with_validator(validator);
        self
    }

    /// Sets the transform applied at capture time.
    #[must_use]
    pub fn capture_copy<F>(mut self, copy: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.options = self.options.with_capture_copy(copy);
        self
    }

    /// Sets the transform applied at install time.
    #[must_use]
    pub fn install_copy<F>(mut self, copy: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.options = self.options.with_install_copy(copy);
        self
    }

    /// Builds the slot and registers it globally.
    #[must_use]
    pub fn register(self) -> ContextSlot<T> {
        self.register_in(ContextRegistry::global())
    }

    /// Builds the slot and registers it in `registry`.
    #[must_use]
    pub fn register_in(self, registry: &ContextRegistry) -> ContextSlot<T> {
        ContextSlot::create(self.name, self.options, registry.clone())
    }
}
