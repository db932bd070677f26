//! Blocking fan-out over `n` indexed workers.

use std::thread;

/// Runs `task(0)..task(n - 1)` concurrently, one scoped thread each, and returns once
/// all of them have returned.
///
/// `task` may borrow from the caller's stack. If a worker panics, the panic is
/// propagated to the caller after every other worker has finished.
pub fn run<F>(n: usize, task: F)
where
    F: Fn(usize) + Sync,
{
    if n == 0 {
        return;
    }

    log::debug!("run: starting {n} workers");
    let task = &task;
    thread::scope(|scope| {
        for id in 0..n {
            thread::Builder::new()
                .name(format!("fanout-run-{id}"))
                .spawn_scoped(scope, move || task(id))
                .expect("spawn thread");
        }
    });
}
