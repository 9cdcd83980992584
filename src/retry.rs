//! Reusable retry policy with exponential backoff and jitter.
//!
//! Both external call sites — page fetching and the LLM API — share this
//! policy instead of carrying their own sleep-in-loop logic. A policy is
//! constructed once from configuration and injected into the call site.
//!
//! # Backoff Strategy
//!
//! The delay before retry `attempt` (1-based) follows:
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use rand::{Rng, rng};
use std::time::Duration;

/// Bounded-attempt retry schedule for transient external failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    pub base_delay: Duration,
    /// Delay cap to prevent excessive waiting.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration, max_delay: Duration) -> Self {
        RetryPolicy {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Deterministic backoff delay for a 1-based attempt number.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(31) as u32;
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }

    /// [`delay_for`](Self::delay_for) plus 0–250 ms of random jitter to
    /// avoid thundering-herd retries.
    pub fn jittered_delay(&self, attempt: usize) -> Duration {
        let jitter_ms: u64 = rng().random_range(0..=250);
        self.delay_for(attempt) + Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(8));
        for _ in 0..20 {
            let d = policy.jittered_delay(2);
            assert!(d >= Duration::from_secs(4));
            assert!(d <= Duration::from_secs(4) + Duration::from_millis(250));
        }
    }
}
