//! Error types for tfresource

use std::fmt;
use std::time::Duration;

/// Error returned by every wait and retry helper
///
/// `E` is the caller's own error type. Errors produced by the probe are
/// surfaced unchanged through [`RetryError::Operation`]; every other variant
/// describes why the engine itself stopped.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error(transparent)]
    Operation(E),

    #[error(
        "timeout while waiting for state to become '{}' (last state: '{last_state}', timeout: {timeout:?})",
        .expected.join(", ")
    )]
    Timeout {
        last_state: String,
        expected: Vec<String>,
        timeout: Duration,
    },

    #[error("unexpected state '{state}', wanted target '{}'", .expected.join(", "))]
    UnexpectedState { state: String, expected: Vec<String> },

    #[error("couldn't find resource ({retries} retries)")]
    NotFound { retries: u32 },

    #[error("timeout must be greater than zero, got {0:?}")]
    InvalidTimeout(Duration),

    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl<E> RetryError<E> {
    /// True when the wait gave up because its time budget ran out
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::Timeout { .. } | RetryError::DeadlineExceeded)
    }

    /// The caller's own error, if this is one
    pub fn operation(&self) -> Option<&E> {
        match self {
            RetryError::Operation(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_operation(self) -> Option<E> {
        match self {
            RetryError::Operation(err) => Some(err),
            _ => None,
        }
    }

    /// Apply `f` to the caller's error, leaving engine errors untouched
    pub fn map_operation<F>(self, f: impl FnOnce(E) -> F) -> RetryError<F> {
        match self {
            RetryError::Operation(err) => RetryError::Operation(f(err)),
            RetryError::Timeout {
                last_state,
                expected,
                timeout,
            } => RetryError::Timeout {
                last_state,
                expected,
                timeout,
            },
            RetryError::UnexpectedState { state, expected } => {
                RetryError::UnexpectedState { state, expected }
            }
            RetryError::NotFound { retries } => RetryError::NotFound { retries },
            RetryError::InvalidTimeout(timeout) => RetryError::InvalidTimeout(timeout),
            RetryError::Cancelled => RetryError::Cancelled,
            RetryError::DeadlineExceeded => RetryError::DeadlineExceeded,
        }
    }
}

/// Result type alias for wait and retry operations
pub type Result<T, E> = std::result::Result<T, RetryError<E>>;

/// A resource lookup found nothing
///
/// Finder functions return this so that wait helpers and resource `read`
/// implementations can tell "gone" apart from other API failures.
#[derive(Debug, Default)]
pub struct NotFoundError {
    pub message: Option<String>,
    pub retries: u32,
    pub last_error: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl NotFoundError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_last_error(
        mut self,
        err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        self.last_error = Some(err.into());
        self
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, self.retries) {
            (Some(message), _) if !message.is_empty() => f.write_str(message),
            (_, 0) => f.write_str("couldn't find resource"),
            (_, retries) => write!(f, "couldn't find resource ({} retries)", retries),
        }
    }
}

impl std::error::Error for NotFoundError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.last_error
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

/// An error reported by a remote service: a symbolic code plus a message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CodedError {
    pub code: String,
    pub message: String,
}

impl CodedError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
