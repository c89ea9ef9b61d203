//! Retry policy for failed queue items

use std::time::Duration;

/// What a worker does when the processor fails an item
///
/// A failed item waits `backoff(attempts)` and then rejoins the queue at
/// the tail. Once `max_attempts` failures have been seen it is moved to the
/// dead-letter list instead. `max_attempts: None` retries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures allowed before an item is dead-lettered (None = unlimited)
    pub max_attempts: Option<u32>,

    /// Backoff after the first failure (milliseconds)
    pub base_backoff_ms: u64,

    /// Upper bound on the exponential backoff (milliseconds)
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(16),
            base_backoff_ms: 10,
            max_backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Requeue immediately and forever
    pub fn immediate() -> Self {
        Self {
            max_attempts: None,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Requeue immediately, dead-letter after `max_attempts` failures
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Set the exponential backoff bounds
    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.base_backoff_ms = base_ms;
        self.max_backoff_ms = max_ms;
        self
    }

    /// Delay before requeueing an item that has failed `attempts` times
    pub fn backoff(&self, attempts: u32) -> Duration {
        if attempts == 0 || self.base_backoff_ms == 0 {
            return Duration::ZERO;
        }

        let shift = (attempts - 1).min(32);
        let ms = self
            .base_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);

        Duration::from_millis(ms)
    }

    /// True once an item with `attempts` failures must not be retried
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        matches!(self.max_attempts, Some(max) if attempts >= max)
    }
}
