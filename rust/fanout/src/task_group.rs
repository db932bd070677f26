//! Concurrent "all of" with error aggregation.
//!
//! [`run_all`] starts every task at once and returns a [`Completion`] handle without
//! waiting. A failing task never cancels its siblings: every task runs to the end, each
//! error is collected, and the done signal fires exactly once after the last task has
//! returned.
//!
//! ```rust,no_run
//! use fanout::task_group::TaskGroup;
//! use fanout_common::Error;
//!
//! let completion = TaskGroup::<Error>::new()
//!     .add(|| Ok(()))
//!     .add(|| Err(Error::task_failed("CRASH")))
//!     .run();
//!
//! let errors = completion.wait();
//! assert_eq!(errors.len(), 1);
//! ```

use std::{panic::AssertUnwindSafe, sync::Arc};

use fanout_common::{AggregateError, TaskPanic};
use fanout_workflow::{
    executor::{Executor, ThreadPerTask},
    mpmc,
    oneshot::{self, OneshotReceiver, OneshotSender},
};

use crate::completion::{CompletionCounter, CompletionGuard, Finalizer, Finalizers};

/// A zero-argument fallible unit of work.
pub type Task<E> = Box<dyn FnOnce() -> Result<(), E> + Send + 'static>;

/// Runs every task concurrently, one thread per task.
///
/// Returns immediately. An empty `tasks` yields a handle that is already done and
/// carries no errors.
pub fn run_all<I, F, E>(tasks: I) -> Completion<E>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: From<TaskPanic> + Send + 'static,
{
    run_all_on(ThreadPerTask::new(), tasks)
}

/// Runs every task concurrently on `executor`.
pub fn run_all_on<X, I, F, E>(executor: X, tasks: I) -> Completion<E>
where
    X: Executor,
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: From<TaskPanic> + Send + 'static,
{
    dispatch("run_all", &executor, tasks.into_iter().collect(), Vec::new())
}

/// Collects heterogeneous tasks before starting them together.
pub struct TaskGroup<E> {
    tasks: Vec<Task<E>>,
}

impl<E> TaskGroup<E>
where
    E: From<TaskPanic> + Send + 'static,
{
    pub fn new() -> TaskGroup<E> {
        TaskGroup { tasks: Vec::new() }
    }

    pub fn add<F>(mut self, task: F) -> TaskGroup<E>
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        self.tasks.push(Box::new(task));
        self
    }

    pub fn push<F>(&mut self, task: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        self.tasks.push(Box::new(task));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Starts every task, one thread per task.
    pub fn run(self) -> Completion<E> {
        run_all(self.tasks)
    }

    /// Starts every task on `executor`.
    pub fn run_on(self, executor: impl Executor) -> Completion<E> {
        run_all_on(executor, self.tasks)
    }
}

impl<E> Default for TaskGroup<E>
where
    E: From<TaskPanic> + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// The result handle of a group of concurrently running tasks.
///
/// Holds a single-slot done signal and an error channel sized to the number of tasks.
/// Every error is enqueued before its task is counted as finished, so once the done
/// signal has fired all errors are already in the channel. The error channel closes no
/// earlier than the done signal fires.
///
/// Dropping the handle does not stop the tasks; their errors are then discarded.
pub struct Completion<E> {
    done: OneshotReceiver<()>,
    errors: mpmc::Receiver<E>,
    task_count: usize,
}

impl<E> Completion<E> {
    /// A handle for an empty group: already done, no errors.
    fn finished() -> Completion<E> {
        let (tx, rx) = mpmc::bounded(1);
        drop(tx);
        Completion {
            done: oneshot::ready(()),
            errors: rx,
            task_count: 0,
        }
    }

    /// The done signal. Fires exactly once, after every task returned.
    pub fn done(&self) -> &OneshotReceiver<()> {
        &self.done
    }

    /// The error channel. Disconnects once every task has finished.
    pub fn errors(&self) -> &mpmc::Receiver<E> {
        &self.errors
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    /// Returns `true` once the done signal has fired. Never blocks.
    pub fn is_done(&self) -> bool {
        !self.done.is_pending()
    }

    /// Blocks until either an error is available or the whole group completed.
    ///
    /// Returns the first error to arrive, or `None` when every task finished and no
    /// uncollected error is left. Calling it repeatedly yields the remaining errors one
    /// by one.
    pub fn first_error(&self) -> Option<E> {
        self.errors.recv().ok()
    }

    /// Blocks until every task finished and returns all collected errors, in arrival
    /// order. Errors already taken through [`first_error`](Self::first_error) or
    /// [`errors`](Self::errors) are not repeated.
    pub fn wait(self) -> Vec<E> {
        let _ = self.done.recv();
        self.errors.iter().collect()
    }

    /// Blocks until every task finished and collapses the collected errors into one
    /// failure. No errors means `Ok(())`.
    pub fn wait_aggregated(self) -> Result<(), AggregateError<E>> {
        match AggregateError::from_errors(self.wait()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

struct GroupState {
    label: &'static str,
    counter: CompletionCounter,
    finalizers: Finalizers,
    done: OneshotSender<()>,
}

impl GroupState {
    /// Runs on the thread of the last task to arrive.
    fn complete(&self) {
        log::trace!("{}: last task finished", self.label);
        self.finalizers.run();
        let _ = self.done.send(());
    }
}

/// Starts `tasks` on `executor` and wires them to a fresh [`Completion`].
///
/// `finalizers` run on the last task's thread right before the done signal fires; with
/// no tasks they run immediately on the caller's thread.
pub(crate) fn dispatch<X, F, E>(
    label: &'static str,
    executor: &X,
    tasks: Vec<F>,
    finalizers: Vec<Finalizer>,
) -> Completion<E>
where
    X: Executor + ?Sized,
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: From<TaskPanic> + Send + 'static,
{
    let task_count = tasks.len();
    if task_count == 0 {
        log::trace!("{label}: no tasks to dispatch");
        Finalizers::new(finalizers).run();
        return Completion::finished();
    }

    log::trace!("{label}: dispatching {task_count} tasks");
    let (done_tx, done_rx) = oneshot::channel();
    let (errors_tx, errors_rx) = mpmc::bounded(task_count);
    let state = Arc::new(GroupState {
        label,
        counter: CompletionCounter::new(task_count),
        finalizers: Finalizers::new(finalizers),
        done: done_tx,
    });

    for task in tasks {
        let state = state.clone();
        let errors = errors_tx.clone();
        executor.execute(Box::new(move || {
            // Bound before the guard, so the sender is released after arriving: the
            // last release closes the error channel, which therefore never happens
            // before the done signal fires.
            let errors = errors;
            let _arrival = CompletionGuard::new(&state.counter, || state.complete());
            if let Err(e) = invoke(label, task) {
                // The channel holds one slot per task, so this never reports `Full`.
                let _ = errors.try_send(e);
            }
        }));
    }

    Completion {
        done: done_rx,
        errors: errors_rx,
        task_count,
    }
}

/// Runs one task, turning a panic into an error of the task's own type.
fn invoke<F, E>(label: &'static str, task: F) -> Result<(), E>
where
    F: FnOnce() -> Result<(), E>,
    E: From<TaskPanic>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(res) => res,
        Err(payload) => {
            let panic = TaskPanic::from_payload(payload);
            log::error!("{label}: {panic}");
            Err(panic.into())
        }
    }
}
