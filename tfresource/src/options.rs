//! Poll timing options shared by the retry helpers and the state waiter

use crate::state::StateChangeConf;
use rand::Rng;
use std::time::Duration;

/// Overrides for how often a wait polls
///
/// Zero values mean "keep the default" and are ignored by [`Options::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Options {
    /// Wait this long before the first check
    pub delay: Duration,
    /// Smallest time to wait between checks, floors the exponential backoff
    pub min_poll_interval: Duration,
    /// Poll exactly this often, replacing backoff and jitter
    pub poll_interval: Duration,
    /// Randomize each backoff wait by up to this fraction (0.0 to 1.0)
    pub jitter: f64,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the delay to a random value in `[0, max)` with millisecond precision
    pub fn with_delay_rand(mut self, max: Duration) -> Self {
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self.delay = if max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..max_ms))
        };
        self
    }

    pub fn with_min_poll_interval(mut self, min_poll_interval: Duration) -> Self {
        self.min_poll_interval = min_poll_interval;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Copy every set field onto `conf`
    pub fn apply(&self, conf: &mut StateChangeConf) {
        if self.delay > Duration::ZERO {
            conf.delay = self.delay;
        }

        if self.min_poll_interval > Duration::ZERO {
            conf.min_timeout = self.min_poll_interval;
        }

        if self.poll_interval > Duration::ZERO {
            conf.poll_interval = self.poll_interval;
        }

        if self.jitter > 0.0 {
            conf.jitter = self.jitter;
        }
    }
}
