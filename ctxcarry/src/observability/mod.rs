//! Observability utilities.

mod tracing;

pub use self::tracing::{init_tracing, TaskOutcome, TaskSpanAttributes, TaskTimer};
