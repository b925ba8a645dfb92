//! Retry helpers driven by error classification
//!
//! These wrap a fallible operation and decide after every attempt whether to
//! try again, stop with the error, or stop with the value. They share the
//! timing core with [`StateChangeConf`] but classify with [`Verdict`] instead
//! of state labels.

use crate::classify::{error_code_equals, error_message_contains, ServiceError};
use crate::context::Context;
use crate::error::{Result, RetryError};
use crate::options::Options;
use crate::poller::{Poller, Stop};
use crate::state::StateChangeConf;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

const RETRYABLE_STATE: &str = "retryableerror";
const SUCCESS_STATE: &str = "success";

/// Classification of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T, E> {
    /// Terminal success, stop and return the value
    Succeed(T),
    /// Transient, try again; the error (if any) is reported if time runs out
    Retry(Option<E>),
    /// Terminal failure, stop and return the error
    Fail(E),
}

impl<T, E> Verdict<T, E> {
    pub fn retryable(err: E) -> Self {
        Verdict::Retry(Some(err))
    }

    pub fn non_retryable(err: E) -> Self {
        Verdict::Fail(err)
    }
}

impl<T, E> From<std::result::Result<T, E>> for Verdict<T, E> {
    /// Errors are terminal unless classified otherwise
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Verdict::Succeed(value),
            Err(err) => Verdict::Fail(err),
        }
    }
}

/// Build a classifier that retries errors matching `is_retryable`
pub fn retry_if<T, E>(
    mut is_retryable: impl FnMut(&E) -> bool,
) -> impl FnMut(std::result::Result<T, E>) -> Verdict<T, E> {
    move |result| match result {
        Ok(value) => Verdict::Succeed(value),
        Err(err) if is_retryable(&err) => Verdict::Retry(Some(err)),
        Err(err) => Verdict::Fail(err),
    }
}

/// Classifier for waiting until a resource is gone
///
/// A successful lookup means the resource still exists, so it is retried with
/// nothing to report; a not-found error is the success condition.
pub fn until_not_found<T, E>() -> impl FnMut(std::result::Result<T, E>) -> Verdict<(), E>
where
    E: ServiceError,
{
    |result| match result {
        Ok(_) => Verdict::Retry(None),
        Err(err) if err.is_not_found() => Verdict::Succeed(()),
        Err(err) => Verdict::Fail(err),
    }
}

enum Outcome<T, E> {
    Done(T),
    Failed(RetryError<E>),
    TimedOut { last_error: Option<E> },
}

/// Drive `f` until `classify` returns a terminal verdict or time runs out
async fn poll_verdicts<R, T, E, F, Fut, C>(
    ctx: &Context,
    conf: &StateChangeConf,
    f: &mut F,
    classify: &mut C,
) -> Outcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = R>,
    C: FnMut(R) -> Verdict<T, E>,
    E: Display,
{
    let mut poller = match Poller::start(ctx, conf).await {
        Ok(poller) => poller,
        Err(stop) => return stopped(stop, conf, None),
    };

    // Most recent retry reason, owned by this call alone
    let mut last_error: Option<E> = None;

    loop {
        let output = match poller.attempt(f()).await {
            Ok(output) => output,
            Err(stop) => return stopped(stop, conf, last_error),
        };

        match classify(output) {
            Verdict::Succeed(value) => return Outcome::Done(value),
            Verdict::Fail(err) => return Outcome::Failed(RetryError::Operation(err)),
            Verdict::Retry(err) => {
                match &err {
                    Some(err) => tracing::debug!(
                        "Retryable error (attempt {}): {}",
                        poller.attempts(),
                        err
                    ),
                    None => tracing::trace!("Retrying (attempt {})", poller.attempts()),
                }
                last_error = err;
            }
        }

        if let Err(stop) = poller.pause(true).await {
            return stopped(stop, conf, last_error);
        }
    }
}

fn stopped<T, E>(stop: Stop, conf: &StateChangeConf, last_error: Option<E>) -> Outcome<T, E> {
    match stop {
        Stop::TimedOut => Outcome::TimedOut { last_error },
        stop => Outcome::Failed(stop.into_error(conf.timeout, RETRYABLE_STATE, &conf.target)),
    }
}

fn retry_conf(timeout: Duration, options: &Options) -> StateChangeConf {
    StateChangeConf::new([RETRYABLE_STATE], [SUCCESS_STATE], timeout).with_options(options)
}

fn timeout_error<E>(conf: &StateChangeConf) -> RetryError<E> {
    Stop::TimedOut.into_error(conf.timeout, RETRYABLE_STATE, &conf.target)
}

/// Retry `f` until it returns a terminal verdict or `timeout` expires
///
/// On timeout the most recent retryable error is returned if there is one,
/// otherwise a [`RetryError::Timeout`]. `options` tune the poll timing, which
/// helps with services prone to throttling.
pub async fn retry<T, E, F, Fut>(
    ctx: &Context,
    timeout: Duration,
    mut f: F,
    options: &Options,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Verdict<T, E>>,
    E: Display,
{
    let conf = retry_conf(timeout, options);

    match poll_verdicts(ctx, &conf, &mut f, &mut |verdict: Verdict<T, E>| verdict).await {
        Outcome::Done(value) => Ok(value),
        Outcome::Failed(err) => Err(err),
        Outcome::TimedOut {
            last_error: Some(err),
        } => Err(RetryError::Operation(err)),
        Outcome::TimedOut { last_error: None } => Err(timeout_error(&conf)),
    }
}

/// Retry `f` while `retryable` classifies its result as transient
///
/// When `timeout` expires while still retrying, `f` is called one last time
/// and that attempt decides the outcome.
pub async fn retry_when<T, U, E, F, Fut, P>(
    ctx: &Context,
    timeout: Duration,
    mut f: F,
    mut retryable: P,
) -> Result<U, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: FnMut(std::result::Result<T, E>) -> Verdict<U, E>,
    E: Display,
{
    let conf = retry_conf(timeout, &Options::default());

    let last_error = match poll_verdicts(ctx, &conf, &mut f, &mut retryable).await {
        Outcome::Done(value) => return Ok(value),
        Outcome::Failed(err) => return Err(err),
        Outcome::TimedOut { last_error } => last_error,
    };

    tracing::debug!("Retry timed out after {:?}, making final attempt", timeout);

    match retryable(f().await) {
        Verdict::Succeed(value) => Ok(value),
        Verdict::Fail(err) | Verdict::Retry(Some(err)) => Err(RetryError::Operation(err)),
        Verdict::Retry(None) => {
            Err(last_error.map_or_else(|| timeout_error(&conf), RetryError::Operation))
        }
    }
}

/// Retry `f` while it fails with one of `codes`
pub async fn retry_when_error_code_equals<T, E, F, Fut>(
    ctx: &Context,
    timeout: Duration,
    f: F,
    codes: &[&str],
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: ServiceError,
{
    retry_when(ctx, timeout, f, retry_if(|err: &E| error_code_equals(err, codes))).await
}

/// Retry `f` while it fails with `code` and a message containing `message`
pub async fn retry_when_error_message_contains<T, E, F, Fut>(
    ctx: &Context,
    timeout: Duration,
    f: F,
    code: &str,
    message: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: ServiceError,
{
    retry_when(
        ctx,
        timeout,
        f,
        retry_if(|err: &E| error_message_contains(err, code, message)),
    )
    .await
}

/// Retry `f` while the resource it looks up is not found yet
pub async fn retry_when_not_found<T, E, F, Fut>(
    ctx: &Context,
    timeout: Duration,
    f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: ServiceError,
{
    retry_when(ctx, timeout, f, retry_if(|err: &E| err.is_not_found())).await
}

/// Retry `f` until the resource it looks up is gone
///
/// Fails with a timeout if the resource is still there when time runs out.
pub async fn retry_until_not_found<T, E, F, Fut>(
    ctx: &Context,
    timeout: Duration,
    f: F,
) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: ServiceError,
{
    retry_when(ctx, timeout, f, until_not_found()).await
}

/// Retry `f` on not-found only while `is_new_resource` is true
///
/// Right after creation a lookup may miss the resource for a while; for an
/// existing resource a miss is a real failure.
pub async fn retry_when_new_resource_not_found<T, E, F, Fut>(
    ctx: &Context,
    timeout: Duration,
    f: F,
    is_new_resource: bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: ServiceError,
{
    retry_when(
        ctx,
        timeout,
        f,
        retry_if(|err: &E| is_new_resource && err.is_not_found()),
    )
    .await
}
