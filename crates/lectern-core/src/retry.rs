//! Bounded retry schedule injected into stages that retry locally.

use std::time::Duration;

/// Longest delay the schedule will ever produce.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Pure description of how often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: u32,
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` total attempts with doubling backoff.
    #[must_use]
    pub const fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            initial_backoff,
            multiplier: 2,
        }
    }

    /// Policy expressed as retries after the first attempt.
    #[must_use]
    pub const fn with_retries(retries: u32, initial_backoff: Duration) -> Self {
        Self::new(retries.saturating_add(1), initial_backoff)
    }

    /// Zero-delay policy, mostly for tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Single attempt, no retries.
    #[must_use]
    pub const fn never() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Override the backoff multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = if multiplier == 0 { 1 } else { multiplier };
        self
    }

    /// Total attempts allowed.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after attempt number `attempt` (1-based) fails.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::never()
    }
}
