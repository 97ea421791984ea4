//! Structured logging for pooled tasks and subscriber setup.

use crate::config::CarryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber filtered by `RUST_LOG`, falling back to
/// `config.log_filter`.
///
/// Returns false if a global subscriber was already set.
pub fn init_tracing(config: &CarryConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

/// How a pooled task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The work returned normally.
    Completed,
    /// The work panicked.
    Panicked,
}

impl TaskOutcome {
    /// Returns the outcome as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Panicked => "panicked",
        }
    }
}

/// Attributes describing one pooled task run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpanAttributes {
    /// Pool label.
    pub pool: String,
    /// Snapshot installed for the run.
    pub snapshot_id: String,
    /// Number of slots in the snapshot.
    pub slots: usize,
    /// Name of the worker thread, if it has one.
    pub thread: Option<String>,
    /// How the run ended.
    pub outcome: Option<TaskOutcome>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Message of the panic, when the run panicked with a string payload.
    pub panic_message: Option<String>,
}

impl TaskSpanAttributes {
    /// Creates attributes naming the current thread; see [`Self::on_worker`].
    #[must_use]
    pub fn new(pool: impl Into<String>, snapshot_id: impl ToString, slots: usize) -> Self {
        Self {
            pool: pool.into(),
            snapshot_id: snapshot_id.to_string(),
            slots,
            thread: std::thread::current().name().map(String::from),
            outcome: None,
            duration_ms: None,
            panic_message: None,
        }
    }

    /// Records the current thread as the one that ran the task.
    #[must_use]
    pub fn on_worker(mut self) -> Self {
        self.thread = std::thread::current().name().map(String::from);
        self
    }

    /// Sets the outcome.
    #[must_use]
    pub fn with_outcome(mut self, outcome: TaskOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_secs_f64() * 1000.0);
        self
    }

    /// Marks the run as panicked, keeping the payload's message if any.
    #[must_use]
    pub fn with_panic(mut self, message: Option<&str>) -> Self {
        self.outcome = Some(TaskOutcome::Panicked);
        self.panic_message = message.map(String::from);
        self
    }

    /// Converts to flat key/value attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("ctxcarry.pool".to_string(), self.pool.clone());
        attrs.insert("ctxcarry.snapshot_id".to_string(), self.snapshot_id.clone());
        attrs.insert("ctxcarry.slots".to_string(), self.slots.to_string());

        if let Some(ref v) = self.thread {
            attrs.insert("thread.name".to_string(), v.clone());
        }
        if let Some(v) = self.outcome {
            attrs.insert("ctxcarry.outcome".to_string(), v.as_str().to_string());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("ctxcarry.duration_ms".to_string(), v.to_string());
        }
        if let Some(ref v) = self.panic_message {
            attrs.insert("ctxcarry.panic_message".to_string(), v.clone());
        }

        attrs
    }

    /// Logs the run: `warn` for panics, `trace` otherwise.
    pub fn emit(&self) {
        let outcome = self.outcome.map_or("unknown", TaskOutcome::as_str);
        match self.outcome {
            Some(TaskOutcome::Panicked) => ::tracing::warn!(
                pool = %self.pool,
                snapshot_id = %self.snapshot_id,
                thread = ?self.thread,
                duration_ms = ?self.duration_ms,
                panic = self.panic_message.as_deref().unwrap_or("<non-string payload>"),
                "Pooled task panicked"
            ),
            _ => ::tracing::trace!(
                pool = %self.pool,
                snapshot_id = %self.snapshot_id,
                slots = self.slots,
                outcome,
                duration_ms = ?self.duration_ms,
                "Pooled task finished"
            ),
        }
    }
}

/// Measures how long one pooled task run takes.
#[derive(Debug, Clone, Copy)]
pub struct TaskTimer(Instant);

impl TaskTimer {
    /// Starts timing now.
    #[must_use]
    pub fn start() -> Self {
        Self(Instant::now())
    }

    /// Returns the time elapsed since [`start`](Self::start).
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}
