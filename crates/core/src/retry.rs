//! Retry policy for webhook deliveries.
//!
//! Delays grow exponentially from `initial_backoff`, are capped at
//! `max_backoff`, and are scaled by a uniform jitter factor so that a burst
//! of failures against one subscriber does not retry in lockstep.

use std::time::Duration;

use rand::Rng;

/// Default total number of attempts (the initial attempt plus one retry).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default upper bound on any single retry delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Upper bound on any configured backoff.
pub const MAX_BACKOFF_CEILING: Duration = Duration::from_secs(24 * 60 * 60);

/// Default jitter fraction (± 20 %).
pub const DEFAULT_JITTER: f64 = 0.2;

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Delay before retry number 1.
    pub initial_backoff: Duration,
    /// Cap applied before jitter.
    pub max_backoff: Duration,
    /// Jitter fraction in `0.0..=1.0`.
    pub jitter: f64,
}

impl RetryPolicy {
    /// Build a policy, clamping out-of-range values. Both backoffs are
    /// capped at [`MAX_BACKOFF_CEILING`].
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        jitter: f64,
    ) -> Self {
        let initial_backoff = initial_backoff.min(MAX_BACKOFF_CEILING);
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.clamp(initial_backoff, MAX_BACKOFF_CEILING),
            jitter: if jitter.is_finite() {
                jitter.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Delay before retry number `retry` (1-based), with jitter applied.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter == 0.0 || base.is_zero() {
            return base;
        }
        let scale = rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        Duration::try_from_secs_f64(base.as_secs_f64() * scale).unwrap_or(base)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_INITIAL_BACKOFF,
            DEFAULT_MAX_BACKOFF,
            DEFAULT_JITTER,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(100),
            Duration::from_millis(1000),
            0.0,
        )
    }

    #[test]
    fn default_allows_exactly_one_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = no_jitter(0);
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn huge_backoff_is_capped_and_jitter_does_not_overflow() {
        let policy = RetryPolicy::new(5, Duration::MAX, Duration::MAX, 1.0);
        assert_eq!(policy.initial_backoff, MAX_BACKOFF_CEILING);
        assert_eq!(policy.max_backoff, MAX_BACKOFF_CEILING);
        for retry in 1..=4 {
            assert!(policy.delay_for(retry) <= MAX_BACKOFF_CEILING * 2);
        }

        // Fields are public, so a policy can skip `new` entirely.
        let unchecked = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::MAX,
            max_backoff: Duration::MAX,
            jitter: 1.0,
        };
        let _ = unchecked.delay_for(1);
    }

    #[test]
    fn delays_double_until_capped() {
        let policy = no_jitter(10);
        assert_eq!(policy.base_delay(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(400));
        assert_eq!(policy.base_delay(4), Duration::from_millis(800));
        assert_eq!(policy.base_delay(5), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(40), Duration::from_millis(1000));
    }

    #[test]
    fn jittered_delay_stays_in_band() {
        let policy = RetryPolicy::new(
            5,
            Duration::from_millis(1000),
            Duration::from_secs(10),
            0.25,
        );
        for _ in 0..200 {
            let d = policy.delay_for(1);
            assert!(d >= Duration::from_millis(750), "{d:?} below band");
            assert!(d <= Duration::from_millis(1250), "{d:?} above band");
        }
    }

    #[test]
    fn jitter_is_clamped() {
        let policy = RetryPolicy::new(2, Duration::ZERO, Duration::ZERO, 7.5);
        assert_eq!(policy.jitter, 1.0);
        let policy = RetryPolicy::new(2, Duration::ZERO, Duration::ZERO, f64::NAN);
        assert_eq!(policy.jitter, 0.0);
    }

    #[test]
    fn zero_backoff_never_sleeps() {
        let policy = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO, 0.5);
        assert_eq!(policy.delay_for(2), Duration::ZERO);
    }
}
