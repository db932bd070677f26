//! A fixed-size thread pool usable as an [`Executor`].
//!
//! Jobs are pushed onto an unbounded [`mpmc`](crate::mpmc) queue shared by all worker
//! threads; each worker pops and runs jobs until every handle to the pool is gone.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use fanout_common::verify_arg;

use crate::{
    executor::{Executor, Job},
    mpmc::{Receiver, Sender},
};

/// A pool of worker threads executing submitted jobs in FIFO order.
///
/// Jobs are handed to the pool through [`spawn_detached`](Self::spawn_detached) or, as
/// an [`Executor`], by the fan-out primitives. A job that panics is logged and
/// discarded; the worker that ran it keeps serving the queue.
///
/// ## Cloning
///
/// Clones share the same workers and queue. The workers exit once the last clone is
/// dropped and every queued job has run.
///
/// ## Thread Safety
///
/// Every method takes `&self` and may be called from any number of threads at once.
#[derive(Clone)]
pub struct ThreadPool {
    queue: Sender<Job>,
    num_threads: usize,
}

impl ThreadPool {
    /// Creates a pool with `num_threads` unnamed workers.
    ///
    /// # Arguments
    ///
    /// * `num_threads` - The number of worker threads to start. Must be greater than 0.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0.
    pub fn new(num_threads: usize) -> ThreadPool {
        Self::with_thread_name(num_threads, |_| String::new())
    }

    /// Fallible version of [`new`](Self::new).
    ///
    /// # Errors
    ///
    /// Returns an `InvalidArgument` error instead of panicking when `num_threads` is 0.
    pub fn try_new(num_threads: usize) -> fanout_common::Result<ThreadPool> {
        verify_arg!(num_threads, num_threads != 0);
        Ok(Self::new(num_threads))
    }

    /// Creates a pool with `num_threads` workers and custom thread names.
    ///
    /// Names show up in debuggers, profilers and panic messages, which makes it easy to
    /// tell which pool a stuck or failing job belongs to.
    ///
    /// # Arguments
    ///
    /// * `num_threads` - The number of worker threads to start. Must be greater than 0.
    /// * `thread_name` - Called once per worker with its 0-based index; returns the
    ///   worker's name. An empty string leaves that worker unnamed.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0.
    pub fn with_thread_name(num_threads: usize, thread_name: impl Fn(usize) -> String) -> Self {
        assert_ne!(num_threads, 0);

        let (tx, rx) = crate::mpmc::unbounded::<Job>();
        for i in 0..num_threads {
            let rx = rx.clone();
            let mut builder = thread::Builder::new();
            let name = thread_name(i);
            if !name.is_empty() {
                builder = builder.name(name);
            }
            builder
                .spawn(move || Self::thread_fn(rx))
                .expect("spawn thread");
        }

        ThreadPool {
            queue: tx,
            num_threads,
        }
    }

    /// Sets the size of the pool returned by [`global`](Self::global).
    ///
    /// Only effective before the first call to `global()`; afterwards the global pool
    /// keeps the size it was created with.
    ///
    /// # Arguments
    ///
    /// * `pool_size` - The number of workers of the global pool. Values below 1 are
    ///   clamped to 1.
    ///
    /// # Thread Safety
    ///
    /// May be called from any thread, but racing it against the first `global()` call
    /// leaves unspecified which size wins.
    pub fn configure_global_pool_size(pool_size: usize) {
        GLOBAL_POOL_SIZE.store(pool_size.max(1), Ordering::SeqCst);
    }

    /// The process-wide pool, created on first use.
    ///
    /// # Returns
    ///
    /// A shared pool whose workers are named `fanout-pool-{i}`. Its size is the value
    /// passed to [`configure_global_pool_size`](Self::configure_global_pool_size), or
    /// `ceil(available_parallelism * 1.5)`, or 8 when the parallelism is unknown.
    ///
    /// # Thread Safety
    ///
    /// Initialization happens exactly once even when several threads call this
    /// concurrently; all of them receive the same pool.
    pub fn global() -> &'static ThreadPool {
        static POOL: OnceLock<ThreadPool> = OnceLock::new();
        POOL.get_or_init(|| {
            ThreadPool::with_thread_name(Self::get_global_pool_size(), |i| {
                format!("fanout-pool-{i}")
            })
        })
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Queues `f` for execution on one of the workers and returns immediately.
    ///
    /// There is no handle to wait on; callers that need completion signal it from `f`
    /// (the fan-out primitives do so through their completion counters).
    ///
    /// # Arguments
    ///
    /// * `f` - The job to run. A panic inside it is caught and logged.
    ///
    /// # Panics
    ///
    /// Panics if every worker thread has exited, which cannot happen while `self` is
    /// alive.
    pub fn spawn_detached<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue
            .send(Box::new(f))
            .expect("must have listening worker threads");
    }

    fn get_global_pool_size() -> usize {
        let size = GLOBAL_POOL_SIZE.load(Ordering::SeqCst);
        if size == 0 {
            thread::available_parallelism()
                .map(|n| (n.get() * 3).div_ceil(2))
                .unwrap_or(8)
        } else {
            size
        }
    }

    fn thread_fn(rx: Receiver<Job>) {
        while let Ok(job) = rx.recv() {
            // A panicking job must not take the worker down with it.
            if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                log::error!("thread pool job panicked");
            }
        }
    }
}

impl Executor for ThreadPool {
    fn execute(&self, job: Job) {
        self.spawn_detached(job);
    }
}

static GLOBAL_POOL_SIZE: AtomicUsize = AtomicUsize::new(0);
