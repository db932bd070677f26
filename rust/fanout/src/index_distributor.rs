//! Dynamic distribution of a linear index range over a fixed number of workers.
//!
//! Workers pull indices from a shared atomic cursor instead of being handed fixed
//! blocks up front, so fast workers naturally take more of the range. Every index in
//! `0..count` is claimed by exactly one worker; each worker sees its own claims in
//! increasing order, while the global processing order is unspecified.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

/// Calls `task(i)` exactly once for every `i` in `0..count`, using `workers` concurrent
/// workers that claim indices one at a time. Blocks until the range is exhausted and
/// every worker has returned.
///
/// At most `count` workers are started, since any further one would find the range
/// exhausted. With no workers or an empty range nothing runs; a single worker runs
/// inline on the caller's thread.
pub fn for_each_index<F>(count: usize, workers: usize, task: F)
where
    F: Fn(usize) + Sync,
{
    if count == 0 || workers == 0 {
        return;
    }

    // A worker beyond `count` could never claim an index.
    let workers = workers.min(count);
    let cursor = IndexCursor::new(count);
    if workers == 1 {
        cursor.drain(&task);
        return;
    }

    log::debug!("for_each_index: {count} indices over {workers} workers");
    let (cursor, task) = (&cursor, &task);
    thread::scope(|scope| {
        for worker in 0..workers {
            thread::Builder::new()
                .name(format!("fanout-iter-{worker}"))
                .spawn_scoped(scope, move || cursor.drain(task))
                .expect("spawn thread");
        }
    });
}

/// A shared claim cursor over `0..limit`.
struct IndexCursor {
    next: AtomicUsize,
    limit: usize,
}

impl IndexCursor {
    fn new(limit: usize) -> IndexCursor {
        IndexCursor {
            next: AtomicUsize::new(0),
            limit,
        }
    }

    /// Claims the next unprocessed index, or `None` once the range is exhausted.
    ///
    /// Each call advances the cursor by one, so after exhaustion it overshoots `limit`
    /// by at most the number of workers.
    fn claim(&self) -> Option<usize> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.limit).then_some(index)
    }

    fn drain(&self, task: &impl Fn(usize)) {
        while let Some(index) = self.claim() {
            task(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    fn visit_counts(count: usize, workers: usize) -> Vec<u32> {
        let visits = (0..count).map(|_| AtomicU32::new(0)).collect::<Vec<_>>();
        for_each_index(count, workers, |i| {
            visits[i].fetch_add(1, Ordering::Relaxed);
        });
        visits.into_iter().map(|v| v.into_inner()).collect()
    }

    #[test]
    fn test_squares_into_buffer() {
        let input = (0..10).collect::<Vec<u64>>();
        let output = (0..10).map(|_| Mutex::new(None)).collect::<Vec<_>>();
        for_each_index(input.len(), 2, |i| {
            let mut slot = output[i].lock().unwrap();
            assert!(slot.is_none(), "index {i} written twice");
            *slot = Some(input[i] * input[i]);
        });
        let output = output
            .into_iter()
            .map(|slot| slot.into_inner().unwrap().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(output, [0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);
    }

    #[test]
    fn test_every_index_exactly_once() {
        for (count, workers) in [(1, 1), (10, 3), (7, 7), (100, 8), (1000, 5)] {
            assert!(
                visit_counts(count, workers).iter().all(|&v| v == 1),
                "count={count} workers={workers}"
            );
        }
    }

    #[test]
    fn test_random_shapes() {
        fastrand::seed(1729);
        for _ in 0..20 {
            let count = fastrand::usize(0..500);
            let workers = fastrand::usize(1..12);
            assert!(visit_counts(count, workers).iter().all(|&v| v == 1));
        }
    }

    #[test]
    fn test_more_workers_than_indices() {
        assert_eq!(visit_counts(3, 16), [1, 1, 1]);
    }

    #[test]
    fn test_workers_capped_at_count() {
        let threads = Mutex::new(Vec::new());
        for_each_index(3, 10_000, |_| {
            threads.lock().unwrap().push(thread::current().name().map(str::to_owned));
        });
        let mut threads = threads.into_inner().unwrap();
        assert_eq!(threads.len(), 3);
        threads.sort();
        threads.dedup();
        assert!(threads.iter().all(|name| {
            let name = name.as_deref().unwrap();
            ["fanout-iter-0", "fanout-iter-1", "fanout-iter-2"].contains(&name)
        }));

        let caller = thread::current().id();
        for_each_index(1, 64, |i| {
            assert_eq!(i, 0);
            assert_eq!(thread::current().id(), caller);
        });
    }

    #[test]
    fn test_degenerate_inputs() {
        for_each_index(10, 0, |_| unreachable!("no worker should run"));
        for_each_index(0, 4, |_| unreachable!("empty range"));
    }

    #[test]
    fn test_single_worker_runs_inline_in_order() {
        let caller = thread::current().id();
        let order = Mutex::new(Vec::new());
        for_each_index(5, 1, |i| {
            assert_eq!(thread::current().id(), caller);
            order.lock().unwrap().push(i);
        });
        assert_eq!(order.into_inner().unwrap(), [0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_each_worker_sees_increasing_claims() {
        let per_worker = Mutex::new(Vec::<(String, usize)>::new());
        for_each_index(200, 4, |i| {
            let name = thread::current().name().unwrap_or_default().to_string();
            per_worker.lock().unwrap().push((name, i));
        });
        let per_worker = per_worker.into_inner().unwrap();
        assert_eq!(per_worker.len(), 200);
        for worker in 0..4 {
            let name = format!("fanout-iter-{worker}");
            let claims = per_worker
                .iter()
                .filter(|(n, _)| *n == name)
                .map(|(_, i)| *i)
                .collect::<Vec<_>>();
            assert!(claims.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_cursor_stops_at_limit() {
        let cursor = IndexCursor::new(2);
        assert_eq!(cursor.claim(), Some(0));
        assert_eq!(cursor.claim(), Some(1));
        assert_eq!(cursor.claim(), None);
        assert_eq!(cursor.claim(), None);
    }
}
