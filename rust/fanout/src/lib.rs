//! Fan-out/fan-in primitives over OS threads.
//!
//! Non-blocking entry points start their work and hand back a way to observe it:
//!
//! - [`run_all`] / [`TaskGroup`] - run fallible tasks concurrently and collect every
//!   error through a [`Completion`] handle, with no short-circuiting
//! - [`spawn`] / [`Spawner`] - start `n` indexed workers and invoke finalizers after
//!   the last one finishes
//!
//! Blocking entry points return once all of their workers did, and may borrow from the
//! caller's stack:
//!
//! - [`run`] - `n` indexed workers
//! - [`for_each_index`] - dynamic distribution of `0..count` through a shared cursor
//! - [`for_each_block`] - static partitioning of `0..count` into contiguous blocks
//!
//! Every primitive detects the end of its group the same way: a
//! [`CompletionCounter`] whose last decrement is observed by exactly one task.

pub mod block_partition;
pub mod completion;
pub mod index_distributor;
pub mod runner;
pub mod spawner;
pub mod task_group;

pub use block_partition::{BlockPartition, for_each_block};
pub use completion::{CompletionCounter, Finalizer};
pub use index_distributor::for_each_index;
pub use runner::run;
pub use spawner::{Spawner, spawn, spawn_fallible};
pub use task_group::{Completion, Task, TaskGroup, run_all, run_all_on};
