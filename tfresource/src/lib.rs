//! tfresource - retry and state polling for Terraform provider resources
//!
//! Cloud APIs are eventually consistent, throttle, and provision
//! asynchronously. Resource Create/Read/Update/Delete implementations use
//! this crate to keep calling an API until it reaches the state they need,
//! within a bounded amount of time.

// Core modules
pub mod context;
pub mod error;

// Policy modules
pub mod backoff;
pub mod config;
pub mod options;

// Engine modules
mod poller;
pub mod classify;
pub mod retry;
pub mod state;

// Re-exports for convenience
pub use classify::{error_code_equals, error_message_contains, not_found, ServiceError};
pub use config::{Operation, PollConfig, Timeouts};
pub use context::Context;
pub use error::{CodedError, NotFoundError, Result, RetryError};
pub use options::Options;
pub use poller::REFRESH_GRACE_PERIOD;
pub use retry::{
    retry, retry_if, retry_until_not_found, retry_when, retry_when_error_code_equals,
    retry_when_error_message_contains, retry_when_new_resource_not_found, retry_when_not_found,
    until_not_found, Verdict,
};
pub use state::{Snapshot, StateChangeConf, StateRefresh};
