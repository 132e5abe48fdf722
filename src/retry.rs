//! Backoff policy for retries against a single provider.

use std::time::Duration;

use crate::config::RetryConfig;

/// Maps a 1-based attempt number to the delay inserted before the next
/// attempt on the same provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_retry_delay: Duration::from_millis(config.max_retry_delay_ms),
            exponential_backoff: config.exponential_backoff,
        }
    }
}

impl RetryPolicy {
    /// `min(retry_delay * 2^(attempt-1), max_retry_delay)` with exponential
    /// backoff, otherwise a flat `retry_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return self.retry_delay;
        }
        let exponent = attempt.saturating_sub(1).min(31);
        self.retry_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_retry_delay, |d| d.min(self.max_retry_delay))
    }
}
