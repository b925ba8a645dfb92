//! Label based state waiting
//!
//! [`StateChangeConf`] polls a [`StateRefresh`] until the reported state label
//! lands in `target`, keeps going while it is in `pending`, and stops on
//! anything else. This is the level resource implementations use for
//! provisioning workflows with named states ("pending", "available", ...).

use crate::context::Context;
use crate::error::{Result, RetryError};
use crate::poller::{Poller, Stop};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Consecutive not-found refreshes tolerated before giving up
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// What one refresh observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot<T> {
    /// The resource exists and is in `state`
    Found { value: T, state: String },
    /// The resource does not exist (yet, or any more)
    NotFound,
}

impl<T> Snapshot<T> {
    pub fn found(value: T, state: impl Into<String>) -> Self {
        Snapshot::Found {
            value,
            state: state.into(),
        }
    }

    pub fn state(&self) -> Option<&str> {
        match self {
            Snapshot::Found { state, .. } => Some(state),
            Snapshot::NotFound => None,
        }
    }
}

/// One unit of work that reports the current state of a resource
/// Called repeatedly and strictly sequentially by [`StateChangeConf::wait_for_state`]
#[async_trait]
pub trait StateRefresh<T, E>: Send {
    async fn refresh(&mut self) -> std::result::Result<Snapshot<T>, E>;
}

#[async_trait]
impl<T, E, F, Fut> StateRefresh<T, E> for F
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = std::result::Result<Snapshot<T>, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    async fn refresh(&mut self) -> std::result::Result<Snapshot<T>, E> {
        (self)().await
    }
}

/// Configuration for waiting on a resource to reach a target state
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangeConf {
    /// States that mean "keep waiting"
    pub pending: Vec<String>,
    /// States that mean "done"; empty means waiting for the resource to vanish
    pub target: Vec<String>,
    /// Total wall-clock budget, must be non-zero
    pub timeout: Duration,
    /// Wait this long before the first refresh
    pub delay: Duration,
    /// Smallest time to wait between refreshes
    pub min_timeout: Duration,
    /// Refresh exactly this often instead of backing off
    pub poll_interval: Duration,
    /// Randomize backoff waits by up to this fraction
    pub jitter: f64,
    /// Consecutive not-found refreshes to allow, 0 means the default of 20
    pub not_found_checks: u32,
    /// Consecutive target hits required, 0 means 1
    pub continuous_target_occurence: u32,
}

impl StateChangeConf {
    pub fn new<P, T>(pending: P, target: T, timeout: Duration) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            timeout,
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: Duration::ZERO,
            jitter: 0.0,
            not_found_checks: 0,
            continuous_target_occurence: 0,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn with_continuous_target_occurence(mut self, occurences: u32) -> Self {
        self.continuous_target_occurence = occurences;
        self
    }

    pub fn with_options(mut self, options: &crate::options::Options) -> Self {
        options.apply(&mut self);
        self
    }

    /// Poll `refresh` until it reports a target state
    ///
    /// Returns the value observed with the final target state, or `None` when
    /// `target` is empty and the resource disappeared.
    pub async fn wait_for_state<T, E, R>(&self, ctx: &Context, mut refresh: R) -> Result<Option<T>, E>
    where
        R: StateRefresh<T, E>,
    {
        let mut last_state = String::new();

        let mut poller = match Poller::start(ctx, self).await {
            Ok(poller) => poller,
            Err(stop) => return Err(self.stopped(stop, &last_state)),
        };

        let not_found_checks = match self.not_found_checks {
            0 => DEFAULT_NOT_FOUND_CHECKS,
            checks => checks,
        };
        let continuous_target_occurence = self.continuous_target_occurence.max(1);

        let mut not_found_tick = 0u32;
        let mut target_occurence = 0u32;

        loop {
            let snapshot = match poller.attempt(refresh.refresh()).await {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(err)) => return Err(RetryError::Operation(err)),
                Err(stop) => return Err(self.stopped(stop, &last_state)),
            };

            match snapshot {
                Snapshot::NotFound if self.target.is_empty() => {
                    target_occurence += 1;
                    if target_occurence >= continuous_target_occurence {
                        return Ok(None);
                    }
                }
                Snapshot::NotFound => {
                    not_found_tick += 1;
                    tracing::debug!(
                        "Resource not found ({} of {} checks)",
                        not_found_tick,
                        not_found_checks
                    );
                    if not_found_tick > not_found_checks {
                        return Err(RetryError::NotFound {
                            retries: not_found_tick,
                        });
                    }
                }
                Snapshot::Found { value, state } => {
                    not_found_tick = 0;

                    if self.target.contains(&state) {
                        target_occurence += 1;
                        if target_occurence >= continuous_target_occurence {
                            return Ok(Some(value));
                        }
                    } else if self.pending.contains(&state) {
                        target_occurence = 0;
                    } else if !self.pending.is_empty() {
                        return Err(RetryError::UnexpectedState {
                            state,
                            expected: self.target.clone(),
                        });
                    }

                    last_state = state;
                }
            }

            if let Err(stop) = poller.pause(target_occurence == 0).await {
                return Err(self.stopped(stop, &last_state));
            }
        }
    }

    fn stopped<E>(&self, stop: Stop, last_state: &str) -> RetryError<E> {
        if stop == Stop::TimedOut {
            tracing::warn!(
                "Timeout after {:?} waiting for state to become '{}' (last state: '{}')",
                self.timeout,
                self.target.join(", "),
                last_state
            );
        }
        stop.into_error(self.timeout, last_state, &self.target)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::error::CodedError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    type Refreshed = std::result::Result<Snapshot<u32>, CodedError>;

    /// Refresh that walks through `states`, repeating the last one forever
    fn sequence(
        states: Vec<Option<&'static str>>,
    ) -> (
        Arc<AtomicU32>,
        impl FnMut() -> std::future::Ready<Refreshed> + Send,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let refresh = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) as usize;
            let state = states[n.min(states.len() - 1)];
            std::future::ready(Ok(match state {
                Some(state) => Snapshot::found(n as u32, state),
                None => Snapshot::NotFound,
            }))
        };
        (calls, refresh)
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_target_after_pending() {
        let (calls, refresh) = sequence(vec![
            Some("initiating-request"),
            Some("provisioning"),
            Some("active"),
        ]);
        let conf = StateChangeConf::new(
            ["initiating-request", "provisioning"],
            ["pending-acceptance", "active"],
            Duration::from_secs(60),
        );

        let value = conf.wait_for_state(&Context::new(), refresh).await.unwrap();

        assert_eq!(value, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_state_is_terminal() {
        let (calls, refresh) = sequence(vec![Some("pending"), Some("failed")]);
        let conf = StateChangeConf::new(["pending"], ["available"], Duration::from_secs(60));

        let err = conf
            .wait_for_state(&Context::new(), refresh)
            .await
            .unwrap_err();

        assert!(
            matches!(err, RetryError::UnexpectedState { ref state, .. } if state == "failed"),
            "{err}"
        );
        assert_eq!(
            err.to_string(),
            "unexpected state 'failed', wanted target 'available'"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_state_without_pending_keeps_polling() {
        let (_, refresh) = sequence(vec![Some("whatever"), Some("whatever"), Some("done")]);
        let conf = StateChangeConf::new(Vec::<String>::new(), ["done"], Duration::from_secs(60));

        let value = conf.wait_for_state(&Context::new(), refresh).await.unwrap();

        assert_eq!(value, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_last_state() {
        let (_, refresh) = sequence(vec![Some("deleting")]);
        let conf = StateChangeConf::new(["deleting"], ["deleted"], Duration::from_secs(5));

        let err = conf
            .wait_for_state(&Context::new(), refresh)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "timeout while waiting for state to become 'deleted' (last state: 'deleting', timeout: 5s)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_error_is_returned_verbatim() {
        let conf = StateChangeConf::new(["pending"], ["available"], Duration::from_secs(60));
        let refresh = || async { Err::<Snapshot<u32>, _>(CodedError::new("AccessDenied", "no")) };

        let err = conf
            .wait_for_state(&Context::new(), refresh)
            .await
            .unwrap_err();

        assert_eq!(
            err.into_operation(),
            Some(CodedError::new("AccessDenied", "no"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_target_succeeds_when_resource_disappears() {
        let (calls, refresh) = sequence(vec![Some("deleting"), Some("deleting"), None]);
        let conf = StateChangeConf::new(["deleting"], Vec::<String>::new(), Duration::from_secs(60));

        let value = conf.wait_for_state(&Context::new(), refresh).await.unwrap();

        assert_eq!(value, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_checks_are_bounded() {
        let (calls, refresh) = sequence(vec![None]);
        let conf = StateChangeConf::new(["pending"], ["available"], Duration::from_secs(600))
            .with_not_found_checks(3);

        let err = conf
            .wait_for_state(&Context::new(), refresh)
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::NotFound { retries: 4 }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn found_resets_not_found_count() {
        let (_, refresh) = sequence(vec![
            None,
            None,
            Some("pending"),
            None,
            None,
            Some("available"),
        ]);
        let conf = StateChangeConf::new(["pending"], ["available"], Duration::from_secs(600))
            .with_not_found_checks(2);

        let value = conf.wait_for_state(&Context::new(), refresh).await.unwrap();

        assert_eq!(value, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_target_occurence_requires_consecutive_hits() {
        let (calls, refresh) = sequence(vec![
            Some("available"),
            Some("pending"),
            Some("available"),
            Some("available"),
            Some("available"),
        ]);
        let conf = StateChangeConf::new(["pending"], ["available"], Duration::from_secs(600))
            .with_continuous_target_occurence(3);

        let value = conf.wait_for_state(&Context::new(), refresh).await.unwrap();

        assert_eq!(value, Some(4));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_never_refreshes() {
        let (calls, refresh) = sequence(vec![Some("available")]);
        let conf = StateChangeConf::new(["pending"], ["available"], Duration::ZERO);

        let err = conf
            .wait_for_state(&Context::new(), refresh)
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::InvalidTimeout(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let ctx = Context::new();
        let (calls, refresh) = sequence(vec![Some("pending")]);
        let conf = StateChangeConf::new(["pending"], ["available"], Duration::from_secs(600));

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = conf.wait_for_state(&ctx, refresh).await.unwrap_err();

        assert!(matches!(err, RetryError::Cancelled));
        let calls_at_cancel = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), calls_at_cancel);
    }

    struct Counter {
        remaining: u32,
    }

    #[async_trait]
    impl StateRefresh<&'static str, CodedError> for Counter {
        async fn refresh(&mut self) -> std::result::Result<Snapshot<&'static str>, CodedError> {
            if self.remaining == 0 {
                return Ok(Snapshot::found("ready", "available"));
            }
            self.remaining -= 1;
            Ok(Snapshot::found("waiting", "pending"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn struct_refreshers_are_supported() {
        let conf = StateChangeConf::new(["pending"], ["available"], Duration::from_secs(60));

        let value = conf
            .wait_for_state(&Context::new(), Counter { remaining: 3 })
            .await
            .unwrap();

        assert_eq!(value, Some("ready"));
    }
}
