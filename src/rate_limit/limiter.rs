//! Rate Limiter
//!
//! Binds a named policy to its own bucket store and exposes the single
//! admission check used by the request-handling boundary.

use std::fmt::Debug;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;

use super::config::{RateLimitConfig, RateLimitPolicy};
use super::error::RateLimitError;
use super::store::TokenBucketStore;
use crate::metrics;

pub const GENERAL_LIMITER: &str = "general";
pub const AUTH_LIMITER: &str = "auth";

/// Named admission check over an independent bucket store
#[derive(Debug)]
pub struct RateLimiter<K = IpAddr>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    name: &'static str,
    store: TokenBucketStore<K>,
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Clone + Send + Debug + 'static,
{
    /// Create a limiter over a fresh store
    pub fn new(name: &'static str, policy: RateLimitPolicy) -> Self {
        Self {
            name,
            store: TokenBucketStore::new(name, policy),
        }
    }

    /// General API limiter, built from configuration unchanged
    pub fn general(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let policy = RateLimitPolicy::from_config(config)?;
        Ok(Self::new(GENERAL_LIMITER, policy))
    }

    /// Stricter limiter for login, registration and token exchange.
    ///
    /// Tracks its own bucket population, so a client is counted once here
    /// and once by the general limiter.
    pub fn auth(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let policy = RateLimitPolicy::from_config(config)?.derive_auth(&config.auth)?;
        Ok(Self::new(AUTH_LIMITER, policy))
    }

    /// Whether this request from `key` may proceed
    pub fn check_and_admit(&self, key: &K) -> bool {
        if !self.store.policy().enabled() {
            return true;
        }

        let admitted = self.store.admit(key);
        if admitted {
            metrics::record_admitted(self.name);
        } else {
            metrics::record_rejected(self.name);
            tracing::debug!(limiter = self.name, client = ?key, "Rate limit exceeded");
        }
        admitted
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        self.store.policy()
    }

    pub fn tracked_clients(&self) -> usize {
        self.store.tracked_clients()
    }

    pub fn is_sweeping(&self) -> bool {
        self.store.is_sweeping()
    }

    /// Stop the background sweep
    pub fn stop(&self) {
        self.store.stop();
    }

    /// Underlying store (for tests and diagnostics)
    pub fn store(&self) -> &TokenBucketStore<K> {
        &self.store
    }
}

/// The general and auth limiters, built once at startup and shared by the boundary
#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub general: Arc<RateLimiter>,
    pub auth: Arc<RateLimiter>,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        Ok(Self {
            general: Arc::new(RateLimiter::general(config)?),
            auth: Arc::new(RateLimiter::auth(config)?),
        })
    }

    /// Publish current bucket counts to the metrics gauges
    pub fn refresh_gauges(&self) {
        for limiter in [&self.general, &self.auth] {
            metrics::set_tracked_clients(limiter.name(), limiter.tracked_clients());
        }
    }

    pub fn stop(&self) {
        self.general.stop();
        self.auth.stop();
    }
}
