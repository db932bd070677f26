//! Fire-and-forget workers with completion callbacks.
//!
//! [`spawn`] starts `n` indexed workers and returns at once. Completion is observed
//! only through finalizers: when the last worker finishes, it runs every finalizer in
//! registration order on its own thread. A typical finalizer closes a channel the
//! caller is draining.
//!
//! With `n == 0` no worker runs and the finalizers are invoked immediately on the
//! caller's thread.
//!
//! [`spawn_fallible`] is the fallible sibling: each worker returns a `Result` and the
//! call yields the same [`Completion`] handle as [`run_all`](crate::task_group::run_all).

use std::{panic::AssertUnwindSafe, sync::Arc};

use fanout_common::TaskPanic;
use fanout_workflow::executor::{Executor, ThreadPerTask};

use crate::{
    completion::{CompletionCounter, CompletionGuard, Finalizer, Finalizers},
    task_group::{self, Completion},
};

/// Starts `n` workers `task(0)..task(n - 1)`, one thread each, and runs `finalizers`
/// after the last one returns.
pub fn spawn<F>(n: usize, task: F, finalizers: impl IntoIterator<Item = Finalizer>)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    Spawner::new(n).finalizers(finalizers).spawn(task)
}

/// Starts `n` fallible workers, one thread each, and returns their result handle.
pub fn spawn_fallible<F, E>(n: usize, task: F) -> Completion<E>
where
    F: Fn(usize) -> Result<(), E> + Send + Sync + 'static,
    E: From<TaskPanic> + Send + 'static,
{
    Spawner::new(n).spawn_fallible(task)
}

/// Configures and starts a set of indexed workers.
///
/// ```rust,no_run
/// use fanout::spawner::Spawner;
/// use fanout_workflow::mpmc;
///
/// let (results_tx, results_rx) = mpmc::unbounded();
/// let sender = results_tx.clone();
/// Spawner::new(4)
///     .when_done(move || drop(results_tx))
///     .spawn(move |id| sender.send(id * id).unwrap());
///
/// let mut squares = results_rx.iter().collect::<Vec<_>>();
/// squares.sort();
/// assert_eq!(squares, [0, 1, 4, 9]);
/// ```
pub struct Spawner<X = ThreadPerTask> {
    workers: usize,
    finalizers: Vec<Finalizer>,
    executor: X,
}

impl Spawner<ThreadPerTask> {
    pub fn new(workers: usize) -> Spawner<ThreadPerTask> {
        Spawner {
            workers,
            finalizers: Vec::new(),
            executor: ThreadPerTask::new(),
        }
    }
}

impl<X: Executor> Spawner<X> {
    /// Registers a callback run after the last worker finished.
    pub fn when_done(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.finalizers.push(Box::new(f));
        self
    }

    /// Registers several callbacks, kept in iteration order.
    pub fn finalizers(mut self, finalizers: impl IntoIterator<Item = Finalizer>) -> Self {
        self.finalizers.extend(finalizers);
        self
    }

    /// Runs the workers on `executor` instead of one thread per worker.
    pub fn executor<Y: Executor>(self, executor: Y) -> Spawner<Y> {
        Spawner {
            workers: self.workers,
            finalizers: self.finalizers,
            executor,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Starts the workers and returns immediately.
    ///
    /// A worker that panics is logged and counted as finished, so the finalizers still
    /// run.
    pub fn spawn<F>(self, task: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let n = self.workers;
        if n == 0 {
            log::trace!("spawn: no workers, running finalizers");
            Finalizers::new(self.finalizers).run();
            return;
        }

        log::trace!("spawn: starting {n} workers");
        let shared = Arc::new(SpawnState {
            task,
            counter: CompletionCounter::new(n),
            finalizers: Finalizers::new(self.finalizers),
        });
        for id in 0..n {
            let shared = shared.clone();
            self.executor.execute(Box::new(move || shared.run_worker(id)));
        }
    }

    /// Starts fallible workers and returns the handle collecting their errors.
    ///
    /// Registered finalizers run after the last worker, before the done signal fires.
    pub fn spawn_fallible<F, E>(self, task: F) -> Completion<E>
    where
        F: Fn(usize) -> Result<(), E> + Send + Sync + 'static,
        E: From<TaskPanic> + Send + 'static,
    {
        let task = Arc::new(task);
        let workers = (0..self.workers)
            .map(|id| {
                let task = task.clone();
                move || (*task)(id)
            })
            .collect::<Vec<_>>();
        task_group::dispatch("spawn_fallible", &self.executor, workers, self.finalizers)
    }
}

struct SpawnState<F> {
    task: F,
    counter: CompletionCounter,
    finalizers: Finalizers,
}

impl<F: Fn(usize)> SpawnState<F> {
    fn run_worker(&self, id: usize) {
        let _arrival = CompletionGuard::new(&self.counter, || {
            log::trace!("spawn: last worker finished ({id})");
            self.finalizers.run();
        });
        if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| (self.task)(id))) {
            log::error!("spawn: worker {id}: {}", TaskPanic::from_payload(payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::Duration,
    };

    use fanout_common::Error;
    use fanout_workflow::{mpmc, oneshot, thread_pool::ThreadPool};

    use super::*;

    #[test]
    fn test_workers_drain_shared_queue() {
        let (work_tx, work_rx) = mpmc::bounded::<u64>(3);
        let (done_tx, done_rx) = mpmc::bounded::<u64>(3);
        let results = done_tx.clone();

        spawn(
            3,
            move |_id| {
                for v in work_rx.iter() {
                    results.send(v * v).unwrap();
                }
            },
            [Box::new(move || drop(done_tx)) as Finalizer],
        );

        let feeder = thread::spawn(move || {
            for i in 0..5 {
                work_tx.send(i).unwrap();
            }
        });

        let mut squares = done_rx.iter().collect::<Vec<_>>();
        feeder.join().unwrap();
        squares.sort_unstable();
        assert_eq!(squares, [0, 1, 4, 9, 16]);
    }

    #[test]
    fn test_finalizers_run_once_after_all_workers() {
        let finished = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = oneshot::channel();

        let worker_finished = finished.clone();
        let mut spawner = Spawner::new(8);
        for label in ["first", "second"] {
            let finished = finished.clone();
            let observed = observed.clone();
            spawner = spawner.when_done(move || {
                observed
                    .lock()
                    .unwrap()
                    .push((label, finished.load(Ordering::SeqCst)));
            });
        }
        spawner.when_done(move || tx.send(()).unwrap()).spawn(move |id| {
            thread::sleep(Duration::from_millis(id as u64 * 3));
            worker_finished.fetch_add(1, Ordering::SeqCst);
        });

        rx.recv().unwrap();
        assert_eq!(*observed.lock().unwrap(), [("first", 8), ("second", 8)]);
    }

    #[test]
    fn test_zero_workers_fire_finalizers_immediately() {
        let fired = Arc::new(AtomicUsize::new(0));
        let caller = thread::current().id();
        let fired_clone = fired.clone();
        spawn(
            0,
            |_| unreachable!("no worker should run"),
            [Box::new(move || {
                assert_eq!(thread::current().id(), caller);
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }) as Finalizer],
        );
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_ids_are_distinct() {
        let ids = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = oneshot::channel();
        let sink = ids.clone();
        Spawner::new(16)
            .when_done(move || tx.send(()).unwrap())
            .spawn(move |id| sink.lock().unwrap().push(id));
        rx.recv().unwrap();
        let mut ids = ids.lock().unwrap().clone();
        ids.sort_unstable();
        assert_eq!(ids, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_worker_still_counts() {
        let (tx, rx) = oneshot::channel();
        Spawner::new(3)
            .when_done(move || tx.send("finalized").unwrap())
            .spawn(|id| {
                if id == 1 {
                    panic!("worker failure");
                }
            });
        assert_eq!(rx.recv(), Some("finalized"));
    }

    #[test]
    fn test_spawn_on_thread_pool() {
        let pool = ThreadPool::new(2);
        let total = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();
        let sum = total.clone();
        Spawner::new(10)
            .executor(pool.clone())
            .when_done(move || tx.send(()).unwrap())
            .spawn(move |id| {
                sum.fetch_add(id, Ordering::SeqCst);
            });
        rx.recv().unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 45);
    }

    #[test]
    fn test_spawn_fallible_collects_errors() {
        let errors = spawn_fallible(6, |id| {
            if id % 2 == 1 {
                Err(Error::task_failed(format!("worker {id}")))
            } else {
                Ok(())
            }
        })
        .wait();
        let mut messages = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>();
        messages.sort();
        assert_eq!(messages, ["worker 1", "worker 3", "worker 5"]);

        let empty = spawn_fallible::<_, Error>(0, |_| Ok(()));
        assert!(empty.is_done());
        assert!(empty.wait().is_empty());
    }

    /// An error type whose conversion from a panic panics in turn.
    struct Unconvertible;

    impl From<TaskPanic> for Unconvertible {
        fn from(panic: TaskPanic) -> Self {
            panic!("cannot convert {panic}")
        }
    }

    #[test]
    fn test_spawn_fallible_completes_when_panic_conversion_fails() {
        let finalized = Arc::new(AtomicUsize::new(0));
        let flag = finalized.clone();
        let completion = Spawner::new(2)
            .when_done(move || {
                flag.fetch_add(1, Ordering::SeqCst);
            })
            .spawn_fallible(|id| -> Result<(), Unconvertible> {
                if id == 0 {
                    panic!("worker failure");
                }
                Ok(())
            });
        assert_eq!(completion.done().recv(), Some(()));
        assert!(completion.wait().is_empty());
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spawn_fallible_runs_finalizers_before_done() {
        let finalized = Arc::new(AtomicUsize::new(0));
        let flag = finalized.clone();
        let completion = Spawner::new(4)
            .when_done(move || {
                flag.fetch_add(1, Ordering::SeqCst);
            })
            .spawn_fallible(|_| Ok::<(), Error>(()));
        completion.done().recv().unwrap();
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
    }
}
