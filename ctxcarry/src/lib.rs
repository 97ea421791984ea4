//! # ctxcarry
//!
//! Context that follows work onto pooled threads.
//!
//! Thread-local state is invisible to a worker thread that picks up a task,
//! and pooled threads are reused, so a worker may even see state left behind
//! by an earlier task. ctxcarry fixes both by capturing the submitting
//! thread's context when work is wrapped and replaying it around the work
//! wherever it runs:
//!
//! - **Slots**: named, typed, per-thread values with optional defaults,
//!   validators and copy policies
//! - **Snapshots**: immutable captures of every registered slot
//! - **Replay**: an RAII guard that installs a snapshot and restores the
//!   worker's own state on every exit path, panics included
//! - **Wrappers**: [`ContextTask`] for closures, [`ContextFuture`] for futures
//! - **Pool decoration**: [`ContextPool`] wraps everything submitted to a
//!   [`WorkerPool`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ctxcarry::prelude::*;
//!
//! let user = ContextSlot::<String>::new("user");
//! let pool = ContextPool::new(FixedThreadPool::new(4)?);
//!
//! user.set("alice".to_string())?;
//! let reader = user.clone();
//! let handle = pool.submit(move || reader.get())?;
//! user.set("bob".to_string())?;
//!
//! assert_eq!(handle.join()?, Some("alice".to_string()));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod observability;
pub mod pool;
pub mod registry;
pub mod replay;
pub mod slot;
pub mod snapshot;
pub mod task;
pub mod testing;

pub use config::CarryConfig;
pub use errors::{CarryError, JoinError, PoolError};
pub use pool::{ContextPool, TaskHandle, WorkerPool};
pub use registry::ContextRegistry;
pub use replay::{RestorePolicy, ScopedReplay};
pub use slot::{ContextSlot, SlotOptions};
pub use snapshot::ContextSnapshot;
pub use task::{
    run_cleared, spawn_with_context, wrap, ContextFuture, ContextTask, FutureContextExt,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::CarryConfig;
    pub use crate::errors::{
        CarryError, JoinError, PoolError, RestoreInvariantViolation, ValidationRejectedError,
    };
    pub use crate::pool::{ContextPool, Job, TaskHandle, WorkerPool};
    pub use crate::registry::ContextRegistry;
    pub use crate::replay::{RestorePolicy, ScopedReplay};
    pub use crate::slot::{ContextSlot, SlotBuilder, SlotId, SlotOptions, SlotState, Transmittee};
    pub use crate::snapshot::ContextSnapshot;
    pub use crate::task::{
        run_cleared, spawn_with_context, wrap, ContextFuture, ContextTask, FutureContextExt,
    };
    pub use crate::testing::FixedThreadPool;
}
