//! Serializable polling knobs and per-operation timeouts
//!
//! Providers expose these through their own configuration (provider blocks,
//! JSON fixtures) and turn them into [`Options`] and call-site timeouts.

use crate::options::Options;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout for each resource operation (20 minutes)
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Polling configuration expressed in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub delay_ms: u64,
    pub min_poll_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub jitter: f64,
}

impl From<&PollConfig> for Options {
    fn from(config: &PollConfig) -> Self {
        Options::new()
            .with_delay(Duration::from_millis(config.delay_ms))
            .with_min_poll_interval(Duration::from_millis(config.min_poll_interval_ms))
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
            .with_jitter(config.jitter)
    }
}

impl From<PollConfig> for Options {
    fn from(config: PollConfig) -> Self {
        Options::from(&config)
    }
}

/// Resource lifecycle operation a timeout applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

/// Per-operation timeouts for a resource type, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub create_secs: u64,
    pub read_secs: u64,
    pub update_secs: u64,
    pub delete_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        let secs = DEFAULT_OPERATION_TIMEOUT.as_secs();
        Self {
            create_secs: secs,
            read_secs: secs,
            update_secs: secs,
            delete_secs: secs,
        }
    }
}

impl Timeouts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create(mut self, timeout: Duration) -> Self {
        self.create_secs = timeout.as_secs();
        self
    }

    pub fn with_read(mut self, timeout: Duration) -> Self {
        self.read_secs = timeout.as_secs();
        self
    }

    pub fn with_update(mut self, timeout: Duration) -> Self {
        self.update_secs = timeout.as_secs();
        self
    }

    pub fn with_delete(mut self, timeout: Duration) -> Self {
        self.delete_secs = timeout.as_secs();
        self
    }

    /// Timeout for `operation`; a zero entry falls back to the default
    pub fn get(&self, operation: Operation) -> Duration {
        let secs = match operation {
            Operation::Create => self.create_secs,
            Operation::Read => self.read_secs,
            Operation::Update => self.update_secs,
            Operation::Delete => self.delete_secs,
        };

        if secs == 0 {
            DEFAULT_OPERATION_TIMEOUT
        } else {
            Duration::from_secs(secs)
        }
    }
}
