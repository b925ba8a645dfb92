//! Error classification used by the retry predicates
//!
//! Retry helpers decide whether to try again by asking the caller's error
//! type a few questions: which service error code it carries, what its
//! message says, and whether it means "the resource does not exist".

use crate::error::{CodedError, NotFoundError, RetryError};

/// Classification hooks for errors returned by service calls
///
/// All methods default to "no information", so plain errors are never
/// retried by code or message and never count as not found.
pub trait ServiceError: std::error::Error {
    /// Symbolic error code reported by the service, e.g. `Throttling`
    fn code(&self) -> Option<&str> {
        None
    }

    /// Human readable message reported by the service
    fn message(&self) -> Option<&str> {
        None
    }

    /// True when this error means the resource does not exist
    fn is_not_found(&self) -> bool {
        false
    }
}

impl ServiceError for CodedError {
    fn code(&self) -> Option<&str> {
        Some(&self.code)
    }

    fn message(&self) -> Option<&str> {
        Some(&self.message)
    }
}

impl ServiceError for NotFoundError {
    fn is_not_found(&self) -> bool {
        true
    }
}

impl<E> ServiceError for RetryError<E>
where
    E: ServiceError + 'static,
{
    fn code(&self) -> Option<&str> {
        self.operation().and_then(ServiceError::code)
    }

    fn message(&self) -> Option<&str> {
        self.operation().and_then(ServiceError::message)
    }

    fn is_not_found(&self) -> bool {
        match self {
            RetryError::NotFound { .. } => true,
            RetryError::Operation(err) => err.is_not_found(),
            _ => false,
        }
    }
}

/// True when `err` carries one of `codes`
pub fn error_code_equals<E>(err: &E, codes: &[&str]) -> bool
where
    E: ServiceError + ?Sized,
{
    err.code().is_some_and(|code| codes.contains(&code))
}

/// True when `err` carries `code` and its message contains `needle`
pub fn error_message_contains<E>(err: &E, code: &str, needle: &str) -> bool
where
    E: ServiceError + ?Sized,
{
    err.code() == Some(code) && err.message().is_some_and(|message| message.contains(needle))
}

/// True when `err` means the resource does not exist
pub fn not_found<E>(err: &E) -> bool
where
    E: ServiceError + ?Sized,
{
    err.is_not_found()
}
