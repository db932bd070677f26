//! A multi-producer, multi-consumer channel.
//!
//! Two flavours are provided:
//!
//! - [`bounded`]: a fixed-capacity channel. Task groups size it to the exact number
//!   of producers so that reporting an error never blocks.
//! - [`unbounded`]: a channel with an unlimited buffer, used as the work queue of
//!   [`ThreadPool`](crate::thread_pool::ThreadPool).
//!
//! The channel is disconnected for receivers once every [`Sender`] has been dropped and
//! the buffer is drained; it is closed for senders once every [`Receiver`] has been
//! dropped, at which point buffered items are discarded.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        mpsc::{RecvError, RecvTimeoutError, SendError, TryRecvError, TrySendError},
    },
    time::{Duration, Instant},
};

/// Creates a channel holding at most `capacity` items.
///
/// # Panics
///
/// Panics if `capacity` is zero; rendezvous channels are not supported.
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    assert_ne!(capacity, 0, "bounded channel requires a non-zero capacity");
    let shared = Arc::new(Shared::new(Some(capacity)));
    (Sender(shared.clone()), Receiver(shared))
}

/// Creates a channel with an unlimited buffer; `send` never blocks.
pub fn unbounded<T>() -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared::new(None));
    (Sender(shared.clone()), Receiver(shared))
}

/// The sending half of a channel. Cloning registers another producer.
pub struct Sender<T>(Arc<Shared<T>>);

impl<T> Sender<T> {
    /// Sends `msg`, blocking while a bounded channel is full.
    ///
    /// Fails, handing the message back, if every receiver is gone.
    pub fn send(&self, msg: T) -> Result<(), SendError<T>> {
        let mut state = self.0.lock();
        loop {
            if state.receivers == 0 {
                return Err(SendError(msg));
            }
            if !state.is_full() {
                break;
            }
            state = self.0.not_full.wait(state).unwrap();
        }
        state.items.push_back(msg);
        drop(state);
        self.0.not_empty.notify_one();
        Ok(())
    }

    /// Sends `msg` without blocking.
    pub fn try_send(&self, msg: T) -> Result<(), TrySendError<T>> {
        let mut state = self.0.lock();
        if state.receivers == 0 {
            return Err(TrySendError::Disconnected(msg));
        }
        if state.is_full() {
            return Err(TrySendError::Full(msg));
        }
        state.items.push_back(msg);
        drop(state);
        self.0.not_empty.notify_one();
        Ok(())
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.0.lock().senders += 1;
        Sender(self.0.clone())
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        assert_ne!(state.senders, 0);
        state.senders -= 1;
        if state.senders == 0 {
            drop(state);
            self.0.not_empty.notify_all();
        }
    }
}

/// The receiving half of a channel. Cloning registers another consumer; each item
/// is delivered to exactly one of them.
pub struct Receiver<T>(Arc<Shared<T>>);

impl<T> Receiver<T> {
    /// Blocks until an item is available or every sender is gone and the buffer is
    /// empty.
    pub fn recv(&self) -> Result<T, RecvError> {
        let mut state = self.0.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.0.not_full.notify_one();
                return Ok(item);
            }
            if state.senders == 0 {
                return Err(RecvError);
            }
            state = self.0.not_empty.wait(state).unwrap();
        }
    }

    /// Like [`recv`](Self::recv), but gives up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.0.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.0.not_full.notify_one();
                return Ok(item);
            }
            if state.senders == 0 {
                return Err(RecvTimeoutError::Disconnected);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RecvTimeoutError::Timeout);
            }
            state = self.0.not_empty.wait_timeout(state, deadline - now).unwrap().0;
        }
    }

    /// Takes an item if one is buffered, without blocking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.0.lock();
        match state.items.pop_front() {
            Some(item) => {
                drop(state);
                self.0.not_full.notify_one();
                Ok(item)
            }
            None if state.senders == 0 => Err(TryRecvError::Disconnected),
            None => Err(TryRecvError::Empty),
        }
    }

    /// A blocking iterator that ends once the channel is disconnected and drained.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.recv().ok())
    }

    /// A non-blocking iterator over the items buffered right now.
    pub fn try_iter(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.try_recv().ok())
    }

    /// Returns `true` once every sender is gone, even if items remain buffered.
    pub fn is_disconnected(&self) -> bool {
        self.0.lock().senders == 0
    }

    pub fn len(&self) -> usize {
        self.0.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.0.lock().capacity
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.0.lock().receivers += 1;
        Receiver(self.0.clone())
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        assert_ne!(state.receivers, 0);
        state.receivers -= 1;
        if state.receivers == 0 {
            state.items.clear();
            drop(state);
            self.0.not_full.notify_all();
        }
    }
}

impl<T> IntoIterator for Receiver<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter(self)
    }
}

/// An owning blocking iterator over a [`Receiver`].
pub struct IntoIter<T>(Receiver<T>);

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.0.recv().ok()
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> Shared<T> {
    fn new(capacity: Option<usize>) -> Shared<T> {
        Shared {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity.unwrap_or(0)),
                capacity,
                senders: 1,
                receivers: 1,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap()
    }
}

struct State<T> {
    items: VecDeque<T>,
    capacity: Option<usize>,
    senders: usize,
    receivers: usize,
}

impl<T> State<T> {
    fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.items.len() >= cap)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::mpsc::{RecvTimeoutError, TryRecvError, TrySendError},
        thread,
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_unbounded_preserves_order() {
        let (tx, rx) = unbounded::<i32>();
        for i in 0..1000 {
            tx.send(i).unwrap();
        }
        drop(tx);
        assert_eq!(rx.iter().collect::<Vec<_>>(), (0..1000).collect::<Vec<_>>());
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_bounded_try_send_full() {
        let (tx, rx) = bounded::<i32>(2);
        assert_eq!(rx.capacity(), Some(2));
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        assert!(matches!(tx.try_send(3), Err(TrySendError::Full(3))));
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.recv().unwrap(), 1);
        tx.try_send(3).unwrap();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), [2, 3]);
    }

    #[test]
    #[should_panic]
    fn test_bounded_zero_capacity() {
        let _ = bounded::<i32>(0);
    }

    #[test]
    fn test_bounded_send_blocks_until_space() {
        let (tx, rx) = bounded::<i32>(1);
        tx.send(1).unwrap();
        let producer = thread::spawn(move || {
            // Blocks until the consumer below makes room.
            tx.send(2).unwrap();
        });
        thread::sleep(Duration::from_millis(50));
        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), 2);
        producer.join().unwrap();
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_disconnect_after_last_sender() {
        let (tx, rx) = bounded::<&str>(4);
        let tx2 = tx.clone();
        tx.send("a").unwrap();
        drop(tx);
        assert!(!rx.is_disconnected());
        tx2.send("b").unwrap();
        drop(tx2);
        assert!(rx.is_disconnected());
        // Buffered items are still delivered after the disconnect.
        assert_eq!(rx.recv().unwrap(), "a");
        assert_eq!(rx.try_recv().unwrap(), "b");
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_send_fails_without_receivers() {
        let (tx, rx) = bounded::<i32>(1);
        let rx2 = rx.clone();
        drop(rx);
        tx.send(1).unwrap();
        drop(rx2);
        assert!(tx.send(2).is_err());
        assert!(matches!(tx.try_send(3), Err(TrySendError::Disconnected(3))));
    }

    #[test]
    fn test_recv_timeout() {
        let (tx, rx) = unbounded::<i32>();
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );
        tx.send(5).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_millis(10)), Ok(5));
        drop(tx);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn test_multiple_consumers_share_items() {
        let (tx, rx) = unbounded::<usize>();
        let consumers = (0..4)
            .map(|_| {
                let rx = rx.clone();
                thread::spawn(move || rx.iter().collect::<Vec<_>>())
            })
            .collect::<Vec<_>>();
        drop(rx);
        for i in 0..400 {
            tx.send(i).unwrap();
        }
        drop(tx);
        let mut all = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect::<Vec<_>>();
        all.sort_unstable();
        assert_eq!(all, (0..400).collect::<Vec<_>>());
    }
}
