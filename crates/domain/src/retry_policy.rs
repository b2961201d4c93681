//! Backoff policy for provisioning jobs.
//!
//! Ordinary failures are bounded by `max_attempts`. Deferrals caused by an
//! upstream outage are never counted against that bound; only their delay
//! is capped.

use std::time::Duration;

/// Retry and deferral timing for provisioning jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Ordinary attempts before a grant becomes FAILED.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub retry_base: Duration,
    /// Delay of the first deferral.
    pub defer_base: Duration,
    /// Upper bound for one deferral delay.
    pub defer_max: Duration,
    /// Delay used when pending work is requeued after recovery.
    pub resume_delay: Duration,
    /// Retry count from which operator alerts escalate.
    pub escalation_threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_base: Duration::from_secs(30),
            defer_base: Duration::from_secs(60),
            defer_max: Duration::from_secs(60 * 60),
            resume_delay: Duration::from_secs(5),
            escalation_threshold: 3,
        }
    }
}

impl RetryPolicy {
    /// Returns the default policy with a custom attempt cap.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay after the `attempt`-th failed ordinary attempt (1-based).
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_base.saturating_mul(1_u32 << exponent)
    }

    /// Delay for a job that has already been deferred `deferrals` times.
    #[must_use]
    pub fn defer_delay(&self, deferrals: u32) -> Duration {
        let exponent = deferrals.min(16);
        self.defer_base
            .saturating_mul(1_u32 << exponent)
            .min(self.defer_max)
    }

    /// Whether `retry_count` ordinary failures exhaust the attempt budget.
    #[must_use]
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_attempts
    }

    /// Whether operator alerts for this retry count use raised urgency.
    #[must_use]
    pub fn should_escalate(&self, retry_count: u32) -> bool {
        retry_count >= self.escalation_threshold
    }
}
