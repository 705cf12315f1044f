//! Retry policy for batched commits
//!
//! Backoff grows linearly with the attempt number: delay = base * attempt.

use std::time::Duration;

use crate::config::RunConfig;

/// Bounded retries with growing backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.max_commit_attempts, config.retry_base_delay())
    }

    /// Delay before retrying after the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Whether another attempt is allowed after the given 1-based attempt.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
