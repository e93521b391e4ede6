//! Whole-session retry policy

use std::time::Duration;

use crate::config::SupervisorConfig;
use crate::error::EcuError;

/// Fixed-delay retry over complete session attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_delay())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether attempt number `attempt` (1-based) failing with `error`
    /// warrants another one
    pub fn should_retry(&self, attempt: u32, error: &EcuError) -> bool {
        attempt < self.attempts && error.is_retryable()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SupervisorConfig::default())
    }
}
