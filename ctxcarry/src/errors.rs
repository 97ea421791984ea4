//! Error types for the ctxcarry library.
//!
//! Failures of the wrapped work itself never appear here: a closure that
//! returns `Err` hands that value back verbatim, and a panicking closure is
//! reported through [`JoinError::Panicked`] with its original payload.

use crate::slot::SlotId;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// The main error type for ctxcarry operations.
#[derive(Debug, Error)]
pub enum CarryError {
    /// A slot validator rejected a value.
    #[error("{0}")]
    ValidationRejected(#[from] ValidationRejectedError),

    /// A replay backup did not line up with the snapshot it was taken for.
    #[error("{0}")]
    RestoreInvariant(#[from] RestoreInvariantViolation),

    /// The underlying worker pool refused a job.
    #[error("{0}")]
    Pool(#[from] PoolError),

    /// A submitted task did not produce a result.
    #[error("{0}")]
    Join(#[from] JoinError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error raised when a slot validator rejects a value passed to `set`.
#[derive(Debug, Clone, Error)]
#[error("Value rejected by slot '{slot}': {reason}")]
pub struct ValidationRejectedError {
    /// The slot name.
    pub slot: String,
    /// The slot id.
    pub slot_id: SlotId,
    /// The reason reported by the validator.
    pub reason: String,
}

impl ValidationRejectedError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(slot: impl Into<String>, slot_id: SlotId, reason: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            slot_id,
            reason: reason.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("ValidationRejected"));
        map.insert("slot".to_string(), serde_json::json!(self.slot));
        map.insert("slot_id".to_string(), serde_json::json!(self.slot_id.as_u64()));
        map.insert("reason".to_string(), serde_json::json!(self.reason));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// A backup that does not match the snapshot it was taken for.
///
/// Unreachable in a correct build; surfaced so replay can log it before
/// deciding whether to abort.
#[derive(Debug, Clone, Error)]
#[error("Restore invariant violated for snapshot {snapshot_id}: {detail}")]
pub struct RestoreInvariantViolation {
    /// The snapshot being restored around.
    pub snapshot_id: Uuid,
    /// What went wrong.
    pub detail: String,
}

impl RestoreInvariantViolation {
    /// Creates a new invariant violation.
    #[must_use]
    pub fn new(snapshot_id: Uuid, detail: impl Into<String>) -> Self {
        Self {
            snapshot_id,
            detail: detail.into(),
        }
    }
}

/// Errors reported by a worker pool when accepting a job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool no longer accepts work.
    #[error("Pool '{pool}' is shut down")]
    Shutdown {
        /// The pool name.
        pool: String,
    },

    /// The pool rejected the job.
    #[error("Pool '{pool}' rejected job: {reason}")]
    Rejected {
        /// The pool name.
        pool: String,
        /// The reason for rejection.
        reason: String,
    },
}

impl PoolError {
    /// Creates a shutdown error.
    #[must_use]
    pub fn shutdown(pool: impl Into<String>) -> Self {
        Self::Shutdown { pool: pool.into() }
    }

    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(pool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            pool: pool.into(),
            reason: reason.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::Shutdown { pool } => {
                map.insert("type".to_string(), serde_json::json!("PoolShutdown"));
                map.insert("pool".to_string(), serde_json::json!(pool));
            }
            Self::Rejected { pool, reason } => {
                map.insert("type".to_string(), serde_json::json!("PoolRejected"));
                map.insert("pool".to_string(), serde_json::json!(pool));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// The payload of a panic raised by wrapped work.
///
/// The message of a string payload is extracted up front; the raw payload
/// is kept for [`JoinError::resume`].
pub struct PanicPayload {
    message: Option<String>,
    payload: Mutex<Box<dyn Any + Send + 'static>>,
}

impl PanicPayload {
    /// Wraps a payload obtained from `catch_unwind`.
    #[must_use]
    pub fn new(payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned());
        Self {
            message,
            payload: Mutex::new(payload),
        }
    }

    /// Returns the panic message when the payload is a string.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the raw payload.
    #[must_use]
    pub fn into_inner(self) -> Box<dyn Any + Send + 'static> {
        self.payload.into_inner()
    }
}

impl fmt::Debug for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicPayload")
            .field(&self.message().unwrap_or("<non-string payload>"))
            .finish()
    }
}

/// Errors observed when waiting on a submitted task.
#[derive(Debug, Error)]
pub enum JoinError {
    /// The wrapped work panicked.
    #[error("Task panicked: {}", .0.message().unwrap_or("<non-string payload>"))]
    Panicked(PanicPayload),

    /// The task was dropped without producing a result.
    #[error("Task was dropped before completing")]
    Closed,
}

impl JoinError {
    /// Returns true if the task panicked.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Re-raises the original panic of the wrapped work.
    ///
    /// For [`JoinError::Closed`] a fresh panic is raised instead.
    pub fn resume(self) -> ! {
        match self {
            Self::Panicked(payload) => std::panic::resume_unwind(payload.into_inner()),
            Self::Closed => panic!("Task was dropped before completing"),
        }
    }
}
