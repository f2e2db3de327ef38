//! Exponential retry backoff
//!
//! The n-th consecutive failure waits `min(base * 2^(n-1), ceiling)`.

use crate::{Result, SyncError};
use core_runtime::config::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CEILING};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    ceiling: Duration,
}

impl BackoffPolicy {
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `base` is zero or exceeds `ceiling`.
    pub fn new(base: Duration, ceiling: Duration) -> Result<Self> {
        if base.is_zero() {
            return Err(SyncError::InvalidConfig(
                "backoff base must be positive".to_string(),
            ));
        }
        if base > ceiling {
            return Err(SyncError::InvalidConfig(format!(
                "backoff base {:?} exceeds ceiling {:?}",
                base, ceiling
            )));
        }
        Ok(Self { base, ceiling })
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Delay before the next attempt after `consecutive_failures` failures
    ///
    /// Zero failures means no wait. Saturates at the ceiling instead of
    /// overflowing.
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let exponent = consecutive_failures - 1;
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.ceiling, |delay| delay.min(self.ceiling))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            ceiling: DEFAULT_BACKOFF_CEILING,
        }
    }
}

/// Whether a retry timer is armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrySchedule {
    #[default]
    NoPendingRetry,
    PendingRetry { delay: Duration, armed_at: Instant },
}

impl RetrySchedule {
    pub fn pending(delay: Duration) -> Self {
        RetrySchedule::PendingRetry {
            delay,
            armed_at: Instant::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RetrySchedule::PendingRetry { .. })
    }

    /// When the armed timer fires
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            RetrySchedule::NoPendingRetry => None,
            RetrySchedule::PendingRetry { delay, armed_at } => Some(*armed_at + *delay),
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        match self {
            RetrySchedule::NoPendingRetry => None,
            RetrySchedule::PendingRetry { delay, .. } => Some(*delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(5 * 60 * 60)).unwrap()
    }

    #[test]
    fn test_delay_doubles_per_failure() {
        let policy = policy();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(3), Duration::from_secs(40));
        assert_eq!(policy.delay_for(4), Duration::from_secs(80));
    }

    #[test]
    fn test_delay_is_capped_at_ceiling() {
        let policy = policy();
        // 10s * 2^11 = 20480s > 18000s
        assert_eq!(policy.delay_for(12), Duration::from_secs(18_000));
        assert_eq!(policy.delay_for(40), Duration::from_secs(18_000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(18_000));
    }

    #[test]
    fn test_delay_is_monotonic() {
        let policy = BackoffPolicy::new(Duration::from_millis(3), Duration::from_secs(1)).unwrap();
        let mut previous = Duration::ZERO;
        for n in 0..64 {
            let delay = policy.delay_for(n);
            assert!(delay >= previous);
            assert!(delay <= policy.ceiling());
            previous = delay;
        }
    }

    #[test]
    fn test_invalid_policies_are_rejected() {
        assert!(BackoffPolicy::new(Duration::ZERO, Duration::from_secs(1)).is_err());
        assert!(BackoffPolicy::new(Duration::from_secs(2), Duration::from_secs(1)).is_err());
        assert!(BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base(), DEFAULT_BACKOFF_BASE);
        assert_eq!(policy.ceiling(), DEFAULT_BACKOFF_CEILING);
    }

    #[tokio::test]
    async fn test_retry_schedule_deadline() {
        assert_eq!(RetrySchedule::default(), RetrySchedule::NoPendingRetry);
        assert_eq!(RetrySchedule::NoPendingRetry.deadline(), None);

        let schedule = RetrySchedule::pending(Duration::from_secs(40));
        assert!(schedule.is_pending());
        assert_eq!(schedule.delay(), Some(Duration::from_secs(40)));
        let RetrySchedule::PendingRetry { armed_at, .. } = schedule else {
            panic!("expected pending retry");
        };
        assert_eq!(schedule.deadline(), Some(armed_at + Duration::from_secs(40)));
    }
}
