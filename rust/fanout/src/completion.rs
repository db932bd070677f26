//! Last-one-out detection for a fixed number of concurrent tasks.
//!
//! Every primitive in this crate counts its outstanding tasks with a
//! [`CompletionCounter`]. Each finishing task arrives through a [`CompletionGuard`],
//! so a task that unwinds still counts; the decrement and the zero test are a single
//! atomic operation, so exactly one task observes the transition to zero and becomes
//! responsible for the completion actions (firing a done signal, running finalizers).

use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

/// An atomic count of tasks that have not finished yet.
#[derive(Debug)]
pub struct CompletionCounter(AtomicUsize);

impl CompletionCounter {
    pub fn new(outstanding: usize) -> CompletionCounter {
        CompletionCounter(AtomicUsize::new(outstanding))
    }

    /// Records one finished task.
    ///
    /// Returns `true` for exactly one caller: the one that brought the count to zero.
    /// `AcqRel` makes every side effect of the earlier arrivals visible to that caller.
    ///
    /// # Panics
    ///
    /// Panics if called more times than the initial count.
    pub fn arrive(&self) -> bool {
        let prev = self.0.fetch_sub(1, Ordering::AcqRel);
        assert_ne!(prev, 0, "CompletionCounter::arrive called on a finished counter");
        prev == 1
    }

    /// Number of tasks still outstanding. Stale as soon as it is returned.
    pub fn remaining(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}

/// Arrives on a [`CompletionCounter`] when dropped, including during unwinding.
///
/// Created at the top of a task's job; `on_complete` runs in the guard's `Drop` only if
/// this arrival was the one that brought the counter to zero.
pub struct CompletionGuard<'a, F: FnOnce()> {
    counter: &'a CompletionCounter,
    on_complete: Option<F>,
}

impl<'a, F: FnOnce()> CompletionGuard<'a, F> {
    pub fn new(counter: &'a CompletionCounter, on_complete: F) -> CompletionGuard<'a, F> {
        CompletionGuard {
            counter,
            on_complete: Some(on_complete),
        }
    }
}

impl<F: FnOnce()> Drop for CompletionGuard<'_, F> {
    fn drop(&mut self) {
        if self.counter.arrive() {
            if let Some(on_complete) = self.on_complete.take() {
                on_complete();
            }
        }
    }
}

/// A callback invoked once after the last of a group of workers has finished.
pub type Finalizer = Box<dyn FnOnce() + Send + 'static>;

/// Finalizers waiting for the zero transition of a [`CompletionCounter`].
///
/// Only the task that wins [`CompletionCounter::arrive`] calls [`run`](Self::run), so
/// the lock is never contended; it only moves the `FnOnce` callbacks out of shared
/// state.
#[derive(Default)]
pub struct Finalizers(Mutex<Vec<Finalizer>>);

impl Finalizers {
    pub fn new(finalizers: Vec<Finalizer>) -> Finalizers {
        Finalizers(Mutex::new(finalizers))
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every registered finalizer, in registration order, on the calling
    /// thread. Later calls find the list empty.
    pub fn run(&self) {
        let finalizers = match self.0.lock() {
            Ok(mut list) => std::mem::take(&mut *list),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for finalizer in finalizers {
            finalizer();
        }
    }
}
