//! Retry scheduling after a failed pass.

use std::time::{Duration, Instant};

/// Default number of retries before giving up until the next trigger.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default window after which the failure count resets.
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Exponential backoff without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,

    /// Upper bound on any delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Bounded count of consecutive failed passes.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_retries: u32,
    window: Duration,
    failures: u32,
    first_failure: Option<Instant>,
}

impl RetryBudget {
    pub fn new(max_retries: u32, window: Duration) -> Self {
        Self {
            max_retries,
            window,
            failures: 0,
            first_failure: None,
        }
    }

    /// Record a failed pass.
    ///
    /// Returns the 0-based retry attempt to schedule, or `None` once the
    /// budget is exhausted. Failures older than the window are forgotten.
    pub fn record_failure(&mut self) -> Option<u32> {
        let now = Instant::now();
        match self.first_failure {
            Some(first) if now.duration_since(first) <= self.window => {}
            _ => {
                self.failures = 0;
                self.first_failure = Some(now);
            }
        }

        let attempt = self.failures;
        self.failures += 1;
        (attempt < self.max_retries).then_some(attempt)
    }

    /// Forget all failures (after a successful pass).
    pub fn reset(&mut self) {
        self.failures = 0;
        self.first_failure = None;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_exhausted(&self) -> bool {
        self.failures > self.max_retries
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 100)]
    #[case(1, 200)]
    #[case(3, 800)]
    #[case(10, 5_000)]
    #[case(40, 5_000)]
    fn test_backoff_delay(#[case] attempt: u32, #[case] millis: u64) {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(5));
        assert_eq!(policy.delay(attempt), Duration::from_millis(millis));
    }

    #[test]
    fn test_budget_exhausts() {
        let mut budget = RetryBudget::new(2, Duration::from_secs(60));

        assert_eq!(budget.record_failure(), Some(0));
        assert_eq!(budget.record_failure(), Some(1));
        assert_eq!(budget.record_failure(), None);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn test_budget_reset() {
        let mut budget = RetryBudget::new(1, Duration::from_secs(60));

        assert_eq!(budget.record_failure(), Some(0));
        assert_eq!(budget.record_failure(), None);
        budget.reset();
        assert_eq!(budget.failures(), 0);
        assert_eq!(budget.record_failure(), Some(0));
    }

    #[test]
    fn test_budget_window_expiry() {
        let mut budget = RetryBudget::new(1, Duration::ZERO);

        assert_eq!(budget.record_failure(), Some(0));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(budget.record_failure(), Some(0));
    }
}
