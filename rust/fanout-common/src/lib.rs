//! Core definitions shared by all fanout-* crates: the error type, the task panic
//! error and the aggregate failure produced when several tasks fail.

pub mod error;
pub mod result;

pub use error::{AggregateError, Error, ErrorKind, TaskPanic};
pub use result::Result;
