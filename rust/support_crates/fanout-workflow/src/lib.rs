//! Execution machinery shared by the fan-out primitives.
//!
//! # Key Components
//!
//! ## Executors
//!
//! - [`executor::Executor`] - The trait non-blocking primitives dispatch their work
//!   through, with [`executor::ThreadPerTask`] as the default implementation
//! - [`thread_pool::ThreadPool`] - A fixed-size pool of worker threads, also an
//!   `Executor`
//!
//! ## Communication Channels
//!
//! - [`oneshot`] - Single-value delivery, used for "all tasks are done" signals
//! - [`mpmc`] - Multi-producer, multi-consumer channels, bounded (error collection)
//!   and unbounded (pool work queue)

pub mod executor;
pub mod mpmc;
pub mod oneshot;
pub mod thread_pool;
