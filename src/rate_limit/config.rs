//! Rate Limit Configuration
//!
//! The `[rate_limit]` section of the config file and the immutable
//! [`RateLimitPolicy`] built from it at startup.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::RateLimitError;

/// Default rate limits
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 100;
pub const DEFAULT_BURST_SIZE: u32 = 20;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 180;

/// Floors applied to the derived auth policy
pub const AUTH_MIN_REQUESTS_PER_MINUTE: u32 = 5;
pub const AUTH_MIN_BURST: u32 = 3;

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Sustained request rate per client
    pub requests_per_minute: u32,

    /// Largest instantaneous burst per client
    pub burst_size: u32,

    /// How often idle buckets are swept, in seconds
    pub cleanup_interval_secs: u64,

    /// Buckets untouched for longer than this are evicted, in seconds
    pub idle_timeout_secs: u64,

    /// Key clients by the first `X-Forwarded-For` address instead of the peer
    pub trust_forwarded_for: bool,

    /// Floors for the authentication limiter
    pub auth: AuthLimitConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            burst_size: DEFAULT_BURST_SIZE,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            trust_forwarded_for: false,
            auth: AuthLimitConfig::default(),
        }
    }
}

impl RateLimitConfig {
    /// Disable rate limiting (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Get cleanup duration
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Get idle eviction duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Apply `QUERYDECK_RATE_LIMIT_*` overrides. Unparseable values are ignored.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("QUERYDECK_RATE_LIMIT_ENABLED") {
            self.enabled = val.parse().unwrap_or(self.enabled);
        }

        if let Ok(val) = std::env::var("QUERYDECK_RATE_LIMIT_RPM") {
            if let Ok(rpm) = val.parse() {
                self.requests_per_minute = rpm;
            }
        }

        if let Ok(val) = std::env::var("QUERYDECK_RATE_LIMIT_BURST") {
            if let Ok(burst) = val.parse() {
                self.burst_size = burst;
            }
        }

        if let Ok(val) = std::env::var("QUERYDECK_RATE_LIMIT_CLEANUP_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                if secs > 0 {
                    self.cleanup_interval_secs = secs;
                }
            }
        }

        self
    }
}

/// Floors for the stricter policy guarding login, registration and token exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthLimitConfig {
    /// Lowest sustained rate the auth limiter may be derived down to
    pub min_requests_per_minute: u32,

    /// Lowest burst the auth limiter may be derived down to
    pub min_burst: u32,
}

impl Default for AuthLimitConfig {
    fn default() -> Self {
        Self {
            min_requests_per_minute: AUTH_MIN_REQUESTS_PER_MINUTE,
            min_burst: AUTH_MIN_BURST,
        }
    }
}

/// Immutable admission policy backing one bucket store.
///
/// Only obtainable through [`new`](Self::new), [`from_config`](Self::from_config),
/// [`derive_auth`](Self::derive_auth) or [`disabled`](Self::disabled), so an
/// enabled policy always has a non-zero burst and a usable rate.
/// When `enabled` is false no other field is consulted.
///
/// ```compile_fail
/// use querydeck::rate_limit::RateLimitPolicy;
/// use std::time::Duration;
///
/// let _ = RateLimitPolicy {
///     enabled: true,
///     refill_rate_per_second: 1.0,
///     burst_capacity: 0,
///     idle_eviction_window: Duration::from_secs(1),
///     sweep_interval: Duration::from_secs(1),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitPolicy {
    enabled: bool,
    refill_rate_per_second: f64,
    burst_capacity: u32,
    idle_eviction_window: Duration,
    sweep_interval: Duration,
}

impl RateLimitPolicy {
    /// Build an enabled policy, rejecting values that cannot work at runtime
    pub fn new(
        refill_rate_per_second: f64,
        burst_capacity: u32,
        idle_eviction_window: Duration,
        sweep_interval: Duration,
    ) -> Result<Self, RateLimitError> {
        if !refill_rate_per_second.is_finite() || refill_rate_per_second < 0.0 {
            return Err(RateLimitError::InvalidRate(refill_rate_per_second));
        }
        if burst_capacity == 0 {
            return Err(RateLimitError::ZeroBurst);
        }
        if sweep_interval.is_zero() {
            return Err(RateLimitError::ZeroSweepInterval);
        }
        if idle_eviction_window.is_zero() {
            return Err(RateLimitError::ZeroIdleWindow);
        }

        Ok(Self {
            enabled: true,
            refill_rate_per_second,
            burst_capacity,
            idle_eviction_window,
            sweep_interval,
        })
    }

    /// A complete bypass: every admission succeeds and no state is kept
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            refill_rate_per_second: 0.0,
            burst_capacity: 0,
            idle_eviction_window: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }

    /// Build the general policy straight from configuration
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        Self::new(
            config.requests_per_minute as f64 / 60.0,
            config.burst_size,
            config.idle_timeout(),
            config.cleanup_interval(),
        )
    }

    /// Derive the stricter authentication policy.
    ///
    /// Rate is quartered and burst halved, then both are raised to the
    /// configured floors. `enabled` and the sweep timings are inherited.
    /// The result goes through the same checks as [`new`](Self::new), so a
    /// zero `min_burst` that leaves no capacity is rejected here.
    pub fn derive_auth(&self, floors: &AuthLimitConfig) -> Result<Self, RateLimitError> {
        if !self.enabled {
            return Ok(self.clone());
        }

        let min_rate = floors.min_requests_per_minute as f64 / 60.0;
        Self::new(
            (self.refill_rate_per_second / 4.0).max(min_rate),
            (self.burst_capacity / 2).max(floors.min_burst),
            self.idle_eviction_window,
            self.sweep_interval,
        )
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn refill_rate_per_second(&self) -> f64 {
        self.refill_rate_per_second
    }

    pub fn burst_capacity(&self) -> u32 {
        self.burst_capacity
    }

    pub fn idle_eviction_window(&self) -> Duration {
        self.idle_eviction_window
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Time for one token to accrue.
    ///
    /// `None` when the bucket never refills, or when the interval is too
    /// long to represent as a `Duration`.
    pub fn token_interval(&self) -> Option<Duration> {
        if self.refill_rate_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.refill_rate_per_second).ok()
        } else {
            None
        }
    }

    /// Time for an empty bucket to refill completely
    pub fn time_to_full(&self) -> Option<Duration> {
        self.token_interval()?.checked_mul(self.burst_capacity)
    }
}
