//! Worker pools for tests and demos.

use crate::config::CarryConfig;
use crate::errors::PoolError;
use crate::pool::{Job, WorkerPool};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// A pool of long-lived, reused worker threads fed from one queue.
///
/// Workers survive panicking jobs, so context left behind by one job is
/// visible to the next job on the same thread unless the jobs are wrapped.
#[derive(Debug)]
pub struct FixedThreadPool {
    name: String,
    threads: usize,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl FixedThreadPool {
    /// Starts `threads` workers named `ctxcarry-worker-N`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Rejected`] if a worker thread cannot be spawned.
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        Self::named("ctxcarry", threads)
    }

    /// Starts a pool sized and named by `config`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn from_config(config: &CarryConfig) -> Result<Self, PoolError> {
        Self::named(config.pool_name.clone(), config.worker_threads)
    }

    /// Starts `threads` workers named `{name}-worker-N`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn named(name: impl Into<String>, threads: usize) -> Result<Self, PoolError> {
        let name = name.into();
        let threads = threads.max(1);
        let (sender, receiver) = channel::unbounded::<Job>();

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let pool = name.clone();
            let worker = std::thread::Builder::new()
                .name(format!("{name}-worker-{index}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            warn!(pool = %pool, worker = index, "Job panicked; worker continues");
                        }
                    }
                })
                .map_err(|e| PoolError::rejected(name.clone(), e.to_string()))?;
            workers.push(worker);
        }

        debug!(pool = %name, threads, "Started fixed thread pool");
        Ok(Self {
            name,
            threads,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// Returns the pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of worker threads.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stops accepting jobs, lets queued jobs finish, and joins the workers.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());

        let current = std::thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
        debug!(pool = %self.name, "Fixed thread pool shut down");
    }
}

impl WorkerPool for FixedThreadPool {
    fn execute(&self, job: Job) -> Result<(), PoolError> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(PoolError::shutdown(self.name.clone()));
        };
        sender
            .send(job)
            .map_err(|_| PoolError::shutdown(self.name.clone()))
    }
}

impl Drop for FixedThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A pool that queues jobs until the test decides to run them.
///
/// Jobs run on the thread that calls [`run_all`](Self::run_all), which
/// makes the running thread's own context fully controllable.
#[derive(Default)]
pub struct RecordingPool {
    queue: Mutex<VecDeque<Job>>,
    submitted: Mutex<usize>,
}

impl RecordingPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of queued jobs.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns the number of jobs ever accepted.
    pub fn submitted(&self) -> usize {
        *self.submitted.lock()
    }

    /// Runs the oldest queued job on the current thread.
    ///
    /// Returns false if the queue was empty.
    pub fn run_next(&self) -> bool {
        let job = self.queue.lock().pop_front();
        job.map_or(false, |job| {
            job();
            true
        })
    }

    /// Runs queued jobs in submission order until the queue is empty.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Runs queued jobs newest first until the queue is empty.
    pub fn run_reversed(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.queue.lock().pop_back();
            let Some(job) = job else {
                return ran;
            };
            job();
            ran += 1;
        }
    }

    /// Drops every queued job without running it.
    pub fn discard(&self) -> usize {
        let jobs = std::mem::take(&mut *self.queue.lock());
        jobs.len()
    }
}

impl WorkerPool for RecordingPool {
    fn execute(&self, job: Job) -> Result<(), PoolError> {
        self.queue.lock().push_back(job);
        *self.submitted.lock() += 1;
        Ok(())
    }
}

impl std::fmt::Debug for RecordingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingPool")
            .field("pending", &self.pending())
            .field("submitted", &self.submitted())
            .finish()
    }
}
