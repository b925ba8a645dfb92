//! Wait computation between polls
//!
//! The wait starts at 100ms and doubles before every sleep, bounded below by
//! the minimum poll interval and above by 10s. A fixed poll interval replaces
//! all of that, jitter included.

use rand::Rng;
use std::time::Duration;

pub const INITIAL_WAIT: Duration = Duration::from_millis(100);
pub const MAX_WAIT: Duration = Duration::from_secs(10);
/// Fixed poll intervals at or above this are ignored in favor of backoff
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(180);

#[derive(Debug, Clone)]
pub struct Backoff {
    wait: Duration,
    min_wait: Duration,
    poll_interval: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(min_wait: Duration, poll_interval: Duration, jitter: f64) -> Self {
        Self {
            wait: INITIAL_WAIT,
            min_wait,
            poll_interval,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Wait before the next poll
    ///
    /// `grow` is false while a target state is being re-confirmed, which keeps
    /// the current wait instead of doubling it.
    pub fn next_wait(&mut self, grow: bool) -> Duration {
        if grow {
            self.wait = self.wait.saturating_mul(2);
        }

        if self.poll_interval > Duration::ZERO && self.poll_interval < MAX_POLL_INTERVAL {
            return self.poll_interval;
        }

        if self.wait < self.min_wait {
            self.wait = self.min_wait;
        } else if self.wait > MAX_WAIT {
            self.wait = MAX_WAIT;
        }

        self.jittered(self.wait)
    }

    fn jittered(&self, wait: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return wait;
        }

        let factor = rand::rng().random_range(-self.jitter..=self.jitter);
        wait.mul_f64(1.0 + factor)
    }
}
