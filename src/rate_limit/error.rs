//! Rate Limit Error Types
//!
//! Misconfiguration is the only failure this module reports. Admission
//! itself never fails; a denial is an ordinary `false`.

/// Errors raised while building a rate limit policy
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateLimitError {
    /// Refill rate is negative, NaN or infinite
    #[error("Invalid refill rate: {0} tokens/sec (must be finite and >= 0)")]
    InvalidRate(f64),

    /// Enabled policy with no burst capacity would reject every request
    #[error("Burst capacity must be > 0 when rate limiting is enabled")]
    ZeroBurst,

    /// Sweep task cannot tick on a zero interval
    #[error("Sweep interval must be > 0")]
    ZeroSweepInterval,

    /// Idle window of zero would evict buckets that were just touched
    #[error("Idle eviction window must be > 0")]
    ZeroIdleWindow,
}
