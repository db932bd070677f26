//! A single-slot channel used to deliver exactly one value (typically a "done" signal)
//! from the task that produces it to any number of observers.
//!
//! The channel moves through three states:
//!
//! 1. `Pending`: nothing has been sent yet.
//! 2. `Ready`: a value was sent and is waiting to be taken.
//! 3. `Consumed`: the value was taken by a receiver, or the sender was dropped
//!    without sending.
//!
//! Both halves can be cloned. Only the first successful send is delivered; every
//! receiver clone observes the transition out of `Pending`, but only one of them takes
//! the value. When the last sender is dropped without sending, the channel closes and
//! blocked receivers wake up with `None`.
//!
//! ## Thread Safety
//!
//! Both halves are `Send + Sync` when `T: Send`. State transitions happen under a
//! single mutex, and every transition out of `Pending` wakes all blocked receivers.

use std::{
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Creates a new oneshot channel.
///
/// # Returns
///
/// A `(sender, receiver)` pair sharing one pending slot. Either half can be cloned.
pub fn channel<T>() -> (OneshotSender<T>, OneshotReceiver<T>) {
    let cell = Arc::new(OneshotCell::new(State::Pending));
    (OneshotSender(cell.clone()), OneshotReceiver(cell))
}

/// Creates a receiver that already holds `value`.
///
/// Used to hand out a completion signal for work that finished before anyone could
/// wait on it; `is_pending()` is `false` from the start.
pub fn ready<T>(value: T) -> OneshotReceiver<T> {
    OneshotReceiver(Arc::new(OneshotCell::new(State::Ready(value))))
}

/// The sending half of a oneshot channel.
pub struct OneshotSender<T>(Arc<OneshotCell<T>>);

impl<T> OneshotSender<T> {
    /// Delivers `value` and wakes every waiting receiver.
    ///
    /// # Arguments
    ///
    /// * `value` - The value to deliver.
    ///
    /// # Returns
    ///
    /// `Ok(())` if this was the first send. `Err(value)` hands the value back if
    /// something was already sent, or if the channel was closed through
    /// [`OneshotReceiver::force_close`].
    pub fn send(&self, value: T) -> Result<(), T> {
        self.0.set(value)
    }

    /// Returns `true` while nothing has been sent and the channel is open.
    pub fn is_pending(&self) -> bool {
        self.0.is_pending()
    }
}

impl<T> Clone for OneshotSender<T> {
    fn clone(&self) -> Self {
        self.0.senders.fetch_add(1, Ordering::Relaxed);
        OneshotSender(self.0.clone())
    }
}

impl<T> Drop for OneshotSender<T> {
    fn drop(&mut self) {
        if self.0.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.close();
        }
    }
}

/// The receiving half of a oneshot channel.
#[derive(Clone)]
pub struct OneshotReceiver<T>(Arc<OneshotCell<T>>);

impl<T> OneshotReceiver<T> {
    /// Blocks until the value arrives or the channel is closed.
    ///
    /// # Returns
    ///
    /// `Some(value)` for the first receiver to take it. `None` if the last sender was
    /// dropped without sending, or if the value was already taken by another receiver.
    pub fn recv(&self) -> Option<T> {
        self.0.wait()
    }

    /// Like [`recv`](Self::recv), but gives up after `timeout`.
    ///
    /// # Returns
    ///
    /// `Ok` with the result [`recv`](Self::recv) would have produced, or
    /// `Err(RecvTimeoutError::Timeout)` if the channel was still pending when the
    /// timeout elapsed.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<T>, std::sync::mpsc::RecvTimeoutError> {
        self.0
            .wait_for(timeout)
            .ok_or(std::sync::mpsc::RecvTimeoutError::Timeout)
    }

    /// Takes the value if it is already available, without blocking.
    pub fn try_recv(&self) -> Result<Option<T>, std::sync::mpsc::TryRecvError> {
        self.0
            .try_take()
            .ok_or(std::sync::mpsc::TryRecvError::Empty)
    }

    /// Returns `true` while nothing has been sent and the sender is alive.
    pub fn is_pending(&self) -> bool {
        self.0.is_pending()
    }

    /// Closes the channel; a later `send` hands its value back.
    pub fn force_close(&self) {
        self.0.close();
    }
}

struct OneshotCell<T> {
    state: Mutex<State<T>>,
    condvar: Condvar,
    senders: AtomicUsize,
}

impl<T> OneshotCell<T> {
    fn new(state: State<T>) -> OneshotCell<T> {
        OneshotCell {
            state: Mutex::new(state),
            condvar: Condvar::new(),
            senders: AtomicUsize::new(1),
        }
    }

    fn set(&self, value: T) -> Result<(), T> {
        let res = self.state.lock().unwrap().set(value);
        self.condvar.notify_all();
        res
    }

    fn close(&self) {
        self.state.lock().unwrap().close();
        self.condvar.notify_all();
    }

    fn is_pending(&self) -> bool {
        self.state.lock().unwrap().is_pending()
    }

    /// `None` means "still pending".
    fn try_take(&self) -> Option<Option<T>> {
        let mut state = self.state.lock().unwrap();
        if state.is_pending() {
            None
        } else {
            Some(state.take())
        }
    }

    fn wait(&self) -> Option<T> {
        let guard = self.state.lock().unwrap();
        self.condvar
            .wait_while(guard, |state| state.is_pending())
            .unwrap()
            .take()
    }

    /// `None` means the timeout elapsed while still pending.
    fn wait_for(&self, timeout: Duration) -> Option<Option<T>> {
        let guard = self.state.lock().unwrap();
        let (mut guard, res) = self
            .condvar
            .wait_timeout_while(guard, timeout, |state| state.is_pending())
            .unwrap();
        if res.timed_out() && guard.is_pending() {
            None
        } else {
            Some(guard.take())
        }
    }
}

enum State<T> {
    Pending,
    Ready(T),
    Consumed,
}

impl<T> State<T> {
    fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    fn set(&mut self, value: T) -> Result<(), T> {
        if self.is_pending() {
            *self = State::Ready(value);
            Ok(())
        } else {
            Err(value)
        }
    }

    /// Must not be called while pending.
    fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, State::Consumed) {
            State::Pending => unreachable!("oneshot value taken while pending"),
            State::Ready(value) => Some(value),
            State::Consumed => None,
        }
    }

    fn close(&mut self) {
        if self.is_pending() {
            *self = State::Consumed;
        }
    }
}
