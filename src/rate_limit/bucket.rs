//! Token Bucket
//!
//! Continuous-refill token bucket for a single client key. A bucket is plain
//! data; the owning [`TokenBucketStore`](super::store::TokenBucketStore)
//! serializes access to it, so refill and consume happen as one step.

use std::time::Duration;
use tokio::time::Instant;

use super::config::RateLimitPolicy;

/// Per-client bucket state
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Tokens available right now, within `[0, burst_capacity]`
    available_tokens: f64,

    /// Last time elapsed time was credited to the bucket
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn full(burst_capacity: u32, now: Instant) -> Self {
        Self {
            available_tokens: burst_capacity as f64,
            last_refill: now,
        }
    }

    /// Credit the time elapsed since the last refill.
    ///
    /// `last_refill` never moves backwards, so an instant captured before a
    /// competing caller took the lock cannot credit the same interval twice.
    pub fn refill(&mut self, now: Instant, policy: &RateLimitPolicy) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let capacity = policy.burst_capacity() as f64;

        self.available_tokens = (self.available_tokens
            + elapsed.as_secs_f64() * policy.refill_rate_per_second())
            .min(capacity);
        self.last_refill = self.last_refill.max(now);
    }

    /// Refill, then take one token if a whole one is available
    pub fn try_acquire(&mut self, now: Instant, policy: &RateLimitPolicy) -> bool {
        self.refill(now, policy);

        if self.available_tokens >= 1.0 {
            self.available_tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whether the bucket has gone untouched for longer than `window`
    pub fn is_idle(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.last_refill) > window
    }

    pub fn available_tokens(&self) -> f64 {
        self.available_tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(rate: f64, burst: u32) -> RateLimitPolicy {
        RateLimitPolicy::new(
            rate,
            burst,
            Duration::from_secs(180),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    #[test]
    fn test_new_bucket_is_full() {
        let now = Instant::now();
        let bucket = TokenBucket::full(10, now);
        assert_eq!(bucket.available_tokens(), 10.0);
        assert_eq!(bucket.last_refill(), now);
    }

    #[test]
    fn test_burst_then_deny() {
        let policy = policy(1.0, 3);
        let now = Instant::now();
        let mut bucket = TokenBucket::full(3, now);

        assert!(bucket.try_acquire(now, &policy));
        assert!(bucket.try_acquire(now, &policy));
        assert!(bucket.try_acquire(now, &policy));
        assert!(!bucket.try_acquire(now, &policy));
        assert_eq!(bucket.available_tokens(), 0.0);
    }

    #[test]
    fn test_refill_is_capped() {
        let policy = policy(10.0, 5);
        let start = Instant::now();
        let mut bucket = TokenBucket::full(5, start);

        bucket.try_acquire(start, &policy);
        bucket.refill(start + Duration::from_secs(3600), &policy);
        assert_eq!(bucket.available_tokens(), 5.0);
    }

    #[test]
    fn test_fractional_refill_accumulates() {
        let policy = policy(1.0, 2);
        let start = Instant::now();
        let mut bucket = TokenBucket::full(2, start);
        assert!(bucket.try_acquire(start, &policy));
        assert!(bucket.try_acquire(start, &policy));

        // Two half-second denials still credit their elapsed time
        assert!(!bucket.try_acquire(start + Duration::from_millis(500), &policy));
        assert!(bucket.try_acquire(start + Duration::from_millis(1000), &policy));
        assert!(!bucket.try_acquire(start + Duration::from_millis(1000), &policy));
    }

    #[test]
    fn test_stale_instant_does_not_rewind() {
        let policy = policy(1.0, 1);
        let start = Instant::now();
        let mut bucket = TokenBucket::full(1, start);
        let later = start + Duration::from_secs(5);

        assert!(bucket.try_acquire(later, &policy));
        assert!(!bucket.try_acquire(start, &policy));
        assert_eq!(bucket.last_refill(), later);

        // No credit for the interval already accounted at `later`
        assert!(!bucket.try_acquire(later, &policy));
    }

    #[test]
    fn test_is_idle_is_strict() {
        let start = Instant::now();
        let bucket = TokenBucket::full(1, start);
        let window = Duration::from_secs(10);

        assert!(!bucket.is_idle(start + window, window));
        assert!(bucket.is_idle(start + window + Duration::from_millis(1), window));
    }

    proptest! {
        #[test]
        fn prop_tokens_stay_within_bounds(
            burst in 1u32..50,
            rate in 0.0f64..20.0,
            steps in prop::collection::vec(0u64..5_000, 1..200),
        ) {
            let policy = policy(rate, burst);
            let mut now = Instant::now();
            let mut bucket = TokenBucket::full(burst, now);

            for step_ms in steps {
                now += Duration::from_millis(step_ms);
                bucket.try_acquire(now, &policy);
                prop_assert!(bucket.available_tokens() >= 0.0);
                prop_assert!(bucket.available_tokens() <= burst as f64);
            }
        }

        #[test]
        fn prop_immediate_admissions_equal_burst(burst in 1u32..200, rate in 0.0f64..100.0) {
            let policy = policy(rate, burst);
            let now = Instant::now();
            let mut bucket = TokenBucket::full(burst, now);

            let admitted = (0..burst * 2).filter(|_| bucket.try_acquire(now, &policy)).count();
            prop_assert_eq!(admitted, burst as usize);
        }
    }
}
