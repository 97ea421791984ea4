//! Testing utilities for context propagation.
//!
//! This module provides:
//! - A fixed-size thread pool whose workers are reused across jobs
//! - A recording pool that defers jobs until the test runs them
//! - Assertions over slots and snapshots

mod assertions;
mod pools;

pub use assertions::{assert_absent, assert_no_context, assert_snapshot_value, assert_value};
pub use pools::{FixedThreadPool, RecordingPool};
