//! Timing core shared by the state waiter and the retry helpers
//!
//! A [`Poller`] owns the deadline, the backoff and the cancellation checks of
//! one wait. The caller drives the loop: check, probe, classify, pause.

use crate::backoff::Backoff;
use crate::context::Context;
use crate::error::RetryError;
use crate::state::StateChangeConf;
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};

/// How long a probe already in flight may run past the deadline
pub const REFRESH_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Why a poll loop stopped without a verdict from the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    InvalidTimeout(Duration),
    TimedOut,
    Cancelled,
    DeadlineExceeded,
}

impl Stop {
    /// Convert into the public error, reporting `last_state` on timeout
    pub(crate) fn into_error<E>(
        self,
        timeout: Duration,
        last_state: &str,
        expected: &[String],
    ) -> RetryError<E> {
        match self {
            Stop::InvalidTimeout(timeout) => RetryError::InvalidTimeout(timeout),
            Stop::TimedOut => RetryError::Timeout {
                last_state: last_state.to_string(),
                expected: expected.to_vec(),
                timeout,
            },
            Stop::Cancelled => RetryError::Cancelled,
            Stop::DeadlineExceeded => RetryError::DeadlineExceeded,
        }
    }
}

pub(crate) struct Poller<'a> {
    ctx: &'a Context,
    timeout: Duration,
    deadline: Instant,
    backoff: Backoff,
    attempts: u32,
}

impl<'a> Poller<'a> {
    /// Validate the timeout and sit out the initial delay
    pub(crate) async fn start(ctx: &'a Context, conf: &StateChangeConf) -> Result<Self, Stop> {
        if conf.timeout.is_zero() {
            return Err(Stop::InvalidTimeout(conf.timeout));
        }

        let poller = Self {
            ctx,
            timeout: conf.timeout,
            deadline: Instant::now() + conf.timeout,
            backoff: Backoff::new(conf.min_timeout, conf.poll_interval, conf.jitter),
            attempts: 0,
        };

        poller.check()?;

        if !conf.delay.is_zero() {
            tracing::trace!("Waiting {:?} before first check", conf.delay);
            poller.sleep(conf.delay).await?;
        }

        Ok(poller)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Fail if the context fired or the deadline passed
    pub(crate) fn check(&self) -> Result<(), Stop> {
        if self.ctx.is_cancelled() {
            return Err(self.cancel_reason());
        }

        if Instant::now() >= self.deadline {
            return Err(Stop::TimedOut);
        }

        Ok(())
    }

    /// Run one probe, letting it overrun the deadline by at most the grace period
    pub(crate) async fn attempt<F: Future>(&mut self, probe: F) -> Result<F::Output, Stop> {
        self.check()?;
        self.attempts += 1;

        match time::timeout_at(self.deadline + REFRESH_GRACE_PERIOD, probe).await {
            Ok(output) => Ok(output),
            Err(_) => {
                tracing::warn!(
                    "Probe exceeded refresh grace period of {:?} (attempt {})",
                    REFRESH_GRACE_PERIOD,
                    self.attempts
                );
                Err(Stop::TimedOut)
            }
        }
    }

    /// Sleep until the next probe is due
    pub(crate) async fn pause(&mut self, grow: bool) -> Result<(), Stop> {
        let wait = self.backoff.next_wait(grow);
        tracing::trace!("Waiting {:?} before next try (attempt {})", wait, self.attempts);
        self.sleep(wait).await
    }

    async fn sleep(&self, wait: Duration) -> Result<(), Stop> {
        let wake = (Instant::now() + wait).min(self.deadline);

        tokio::select! {
            _ = time::sleep_until(wake) => {}
            _ = self.ctx.cancelled() => return Err(self.cancel_reason()),
        }

        if Instant::now() >= self.deadline {
            tracing::debug!(
                "Wait timed out after {:?} ({} attempts)",
                self.timeout,
                self.attempts
            );
            return Err(Stop::TimedOut);
        }

        Ok(())
    }

    fn cancel_reason(&self) -> Stop {
        if self.ctx.deadline_exceeded() {
            Stop::DeadlineExceeded
        } else {
            Stop::Cancelled
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn conf(timeout: Duration) -> StateChangeConf {
        StateChangeConf::new(["pending"], ["done"], timeout)
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_fails_fast() {
        let ctx = Context::new();
        let result = Poller::start(&ctx, &conf(Duration::ZERO)).await;

        assert_eq!(result.err(), Some(Stop::InvalidTimeout(Duration::ZERO)));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_elapses_before_start_returns() {
        let ctx = Context::new();
        let begin = Instant::now();
        let c = conf(Duration::from_secs(10)).with_delay(Duration::from_secs(2));

        let poller = Poller::start(&ctx, &c).await;

        assert!(poller.is_ok());
        assert!(begin.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_longer_than_timeout_times_out() {
        let ctx = Context::new();
        let c = conf(Duration::from_secs(1)).with_delay(Duration::from_secs(5));

        let result = Poller::start(&ctx, &c).await;

        assert_eq!(result.err(), Some(Stop::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_never_sleeps_past_deadline() {
        let ctx = Context::new();
        let begin = Instant::now();
        let c = conf(Duration::from_millis(300)).with_poll_interval(Duration::from_secs(60));
        let mut poller = Poller::start(&ctx, &c).await.unwrap();

        assert_eq!(poller.pause(true).await, Err(Stop::TimedOut));
        assert_eq!(begin.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_context_stops_before_first_probe() {
        let ctx = Context::new();
        ctx.cancel();

        let result = Poller::start(&ctx, &conf(Duration::from_secs(10))).await;

        assert_eq!(result.err(), Some(Stop::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn context_deadline_interrupts_sleep() {
        let ctx = Context::new().with_timeout(Duration::from_secs(1));
        let c = conf(Duration::from_secs(60)).with_poll_interval(Duration::from_secs(30));
        let mut poller = Poller::start(&ctx, &c).await.unwrap();

        assert_eq!(poller.pause(true).await, Err(Stop::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_is_abandoned_after_grace_period() {
        let ctx = Context::new();
        let mut poller = Poller::start(&ctx, &conf(Duration::from_secs(1)))
            .await
            .unwrap();

        let result = poller
            .attempt(tokio::time::sleep(Duration::from_secs(3600)))
            .await;

        assert_eq!(result, Err(Stop::TimedOut));
        assert_eq!(poller.attempts(), 1);
    }
}
