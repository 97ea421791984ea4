//! Per-slot policies: default value, validator and copy transforms.

use std::fmt;
use std::sync::Arc;

/// Produces the value `get` returns when nothing is stored.
pub type DefaultFn<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Checks a value passed to `set`; `Err` carries the rejection reason.
pub type ValidatorFn<T> = Arc<dyn Fn(&T) -> Result<(), String> + Send + Sync>;

/// Derives the value that crosses from one thread to another.
pub type CopyFn<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// Policies attached to a [`ContextSlot`](super::ContextSlot).
///
/// Without a copy transform, values are cloned both when captured on the
/// submitting thread and when installed on the worker.
pub struct SlotOptions<T> {
    pub(crate) default: Option<DefaultFn<T>>,
    pub(crate) validator: Option<ValidatorFn<T>>,
    pub(crate) capture_copy: Option<CopyFn<T>>,
    pub(crate) install_copy: Option<CopyFn<T>>,
}

impl<T> SlotOptions<T> {
    /// Creates options with no policies set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default: None,
            validator: None,
            capture_copy: None,
            install_copy: None,
        }
    }

    /// Sets the default value factory.
    #[must_use]
    pub fn with_default<F>(mut self, default: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(default));
        self
    }

    /// Sets the validator run on every `set`.
    #[must_use]
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Sets the transform applied when a snapshot is captured.
    #[must_use]
    pub fn with_capture_copy<F>(mut self, copy: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.capture_copy = Some(Arc::new(copy));
        self
    }

    /// Sets the transform applied when a snapshot is installed on a worker.
    #[must_use]
    pub fn with_install_copy<F>(mut self, copy: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.install_copy = Some(Arc::new(copy));
        self
    }

    /// Returns true if a default factory is set.
    #[must_use]
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Runs the validator, if any.
    pub(crate) fn validate(&self, value: &T) -> Result<(), String> {
        match &self.validator {
            Some(validator) => validator(value),
            None => Ok(()),
        }
    }
}

impl<T: Clone> SlotOptions<T> {
    pub(crate) fn copy_for_capture(&self, value: T) -> T {
        match &self.capture_copy {
            Some(copy) => copy(&value),
            None => value,
        }
    }

    pub(crate) fn copy_for_install(&self, value: &T) -> T {
        self.install_copy
            .as_ref()
            .map_or_else(|| value.clone(), |copy| copy(value))
    }
}

impl<T> Default for SlotOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SlotOptions<T> {
    fn clone(&self) -> Self {
        Self {
            default: self.default.clone(),
            validator: self.validator.clone(),
            capture_copy: self.capture_copy.clone(),
            install_copy: self.install_copy.clone(),
        }
    }
}

impl<T> fmt::Debug for SlotOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotOptions")
            .field("default", &self.default.is_some())
            .field("validator", &self.validator.is_some())
            .field("capture_copy", &self.capture_copy.is_some())
            .field("install_copy", &self.install_copy.is_some())
            .finish()
    }
}
