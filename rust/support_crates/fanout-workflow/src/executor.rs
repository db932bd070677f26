//! The seam between the fan-out primitives and the threads that actually run work.
//!
//! Non-blocking primitives hand `'static` jobs to an [`Executor`] and return right away.
//! Two executors are provided:
//!
//! - [`ThreadPerTask`]: starts a dedicated OS thread for every job. Jobs that wait on
//!   each other (for example workers draining a queue the caller is still filling)
//!   always make progress. This is the default.
//! - [`ThreadPool`](crate::thread_pool::ThreadPool): a fixed set of worker threads.
//!   Cheaper for many short jobs, but jobs that block on one another need at least as
//!   many pool threads as there are mutually-waiting jobs.

use std::{sync::Arc, thread};

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs concurrently with the caller.
///
/// ## Thread Safety
///
/// Executors are shared between the threads that submit work, hence the `Send + Sync`
/// bound; `execute` takes `&self` and must tolerate concurrent calls.
pub trait Executor: Send + Sync {
    /// Starts `job` without waiting for it to finish.
    ///
    /// Implementations must eventually run every job they accept; the fan-out
    /// primitives rely on each job running to detect the end of a group.
    fn execute(&self, job: Job);
}

impl<E: Executor + ?Sized> Executor for &E {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }
}

/// An executor that spawns a detached OS thread for every job.
///
/// Threads are unnamed unless a name prefix is configured, in which case the n-th
/// thread started by this executor is called `"{prefix}-{n}"`.
#[derive(Clone, Debug, Default)]
pub struct ThreadPerTask {
    name_prefix: Option<Arc<str>>,
    stack_size: Option<usize>,
    spawned: Arc<std::sync::atomic::AtomicUsize>,
}

impl ThreadPerTask {
    pub fn new() -> ThreadPerTask {
        ThreadPerTask::default()
    }

    /// Creates an executor whose threads are named `"{prefix}-{n}"`.
    ///
    /// # Arguments
    ///
    /// * `prefix` - The common part of the thread names. An empty prefix leaves the
    ///   threads unnamed, as with [`new`](Self::new).
    pub fn with_thread_name(prefix: impl Into<String>) -> ThreadPerTask {
        let prefix: String = prefix.into();
        ThreadPerTask {
            name_prefix: (!prefix.is_empty()).then(|| prefix.into()),
            ..Default::default()
        }
    }

    /// Sets the stack size of spawned threads.
    ///
    /// # Arguments
    ///
    /// * `bytes` - The stack size; the platform may round it up to its minimum.
    pub fn stack_size(mut self, bytes: usize) -> ThreadPerTask {
        self.stack_size = Some(bytes);
        self
    }

    /// Number of threads started by this executor (and its clones) so far.
    pub fn spawned(&self) -> usize {
        self.spawned.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn builder(&self) -> thread::Builder {
        let n = self
            .spawned
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut builder = thread::Builder::new();
        if let Some(prefix) = &self.name_prefix {
            builder = builder.name(format!("{prefix}-{n}"));
        }
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        builder
    }
}

impl Executor for ThreadPerTask {
    /// # Panics
    ///
    /// Panics if the operating system refuses to create another thread.
    fn execute(&self, job: Job) {
        self.builder().spawn(job).expect("spawn thread");
    }
}
