use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn task_failed(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::TaskFailed {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn panicked(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::TaskPanicked {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn external<E>(context: impl Into<String>, source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(
            ErrorKind::External {
                context: context.into(),
                source: Box::new(source),
            }
            .into(),
        )
    }

    /// Returns `true` if this error was produced by a task that panicked.
    pub fn is_panic(&self) -> bool {
        matches!(self.kind(), ErrorKind::TaskPanicked { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("{message}")]
    TaskFailed { message: String },

    #[error("task panicked: {message}")]
    TaskPanicked { message: String },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        source: StdErrorBoxed,
    },

    #[error(transparent)]
    Aggregate(AggregateError<Error>),
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<TaskPanic> for Error {
    fn from(panic: TaskPanic) -> Self {
        Error::panicked(panic.message)
    }
}

impl From<AggregateError<Error>> for Error {
    fn from(e: AggregateError<Error>) -> Self {
        ErrorKind::Aggregate(e).into()
    }
}

/// The failure reported in place of a task's own error when the task panics.
///
/// Fallible task runners catch the unwind at the task boundary and convert it into
/// the caller's error type through `From<TaskPanic>`, so a panicking task is counted
/// as finished and surfaces through the regular error channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task panicked: {message}")]
pub struct TaskPanic {
    pub message: String,
}

impl TaskPanic {
    pub fn new(message: impl Into<String>) -> TaskPanic {
        TaskPanic {
            message: message.into(),
        }
    }

    /// Builds a `TaskPanic` from the payload returned by `std::panic::catch_unwind`.
    ///
    /// `panic!` payloads are either `&'static str` or `String`; anything else is
    /// reported with a generic message.
    pub fn from_payload(payload: Box<dyn std::any::Any + Send>) -> TaskPanic {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(s) => s.to_string(),
                Err(_) => "non-string panic payload".to_string(),
            },
        };
        TaskPanic { message }
    }
}

/// A single failure value combining the errors of every task that failed.
///
/// The textual form lists all underlying errors, in the order they were collected:
/// `"2 tasks failed: SPLASH; CRASH"`.
#[derive(Debug)]
pub struct AggregateError<E> {
    errors: Vec<E>,
}

impl<E> AggregateError<E> {
    /// Wraps the collected errors; returns `None` for an empty set.
    pub fn from_errors(errors: Vec<E>) -> Option<AggregateError<E>> {
        if errors.is_empty() {
            None
        } else {
            Some(AggregateError { errors })
        }
    }

    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<E> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.errors.iter()
    }
}

impl<E> IntoIterator for AggregateError<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a AggregateError<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl<E: std::fmt::Display> std::fmt::Display for AggregateError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let noun = if self.errors.len() == 1 {
            "task"
        } else {
            "tasks"
        };
        write!(f, "{} {noun} failed: ", self.errors.len())?;
        for (i, e) in self.errors.iter().enumerate() {
            if i != 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl<E> std::error::Error for AggregateError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
