//! Token Bucket Store
//!
//! Owns the `client key -> bucket` map for one policy and the background
//! task that evicts idle buckets.

use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::bucket::TokenBucket;
use super::config::RateLimitPolicy;
use crate::metrics;

type BucketMap<K> = Arc<Mutex<HashMap<K, TokenBucket>>>;

/// Per-key token buckets behind a single lock.
///
/// Admission is synchronous: the lock is held only for the refill-and-decide
/// arithmetic. The sweep task takes the same lock only while it prunes the
/// map, never while it waits for the next tick.
#[derive(Debug)]
pub struct TokenBucketStore<K = IpAddr>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Label used in logs and metrics
    name: String,

    policy: RateLimitPolicy,

    buckets: BucketMap<K>,

    /// Sweep task handle, `None` once stopped or when no sweep was started
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl<K> TokenBucketStore<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Create a store and, for an enabled policy, start its sweep task.
    ///
    /// The sweep needs a tokio runtime. Outside one the store still admits
    /// correctly but never reclaims idle buckets.
    pub fn new(name: impl Into<String>, policy: RateLimitPolicy) -> Self {
        let name = name.into();
        let buckets: BucketMap<K> = Arc::new(Mutex::new(HashMap::new()));

        let sweep_task = if policy.enabled() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => Some(handle.spawn(sweep_loop(
                    name.clone(),
                    buckets.clone(),
                    policy.sweep_interval(),
                    policy.idle_eviction_window(),
                ))),
                Err(_) => {
                    tracing::warn!(
                        limiter = %name,
                        "No tokio runtime available, idle buckets will not be swept"
                    );
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            limiter = %name,
            enabled = policy.enabled(),
            rate_per_sec = policy.refill_rate_per_second(),
            burst = policy.burst_capacity(),
            "Rate limit store started"
        );

        Self {
            name,
            policy,
            buckets,
            sweep_task: Mutex::new(sweep_task),
        }
    }

    /// Decide whether one unit of work from `key` may proceed now
    pub fn admit(&self, key: &K) -> bool {
        if !self.policy.enabled() {
            return true;
        }

        let mut buckets = lock(&self.buckets);
        // Read the clock under the lock so concurrent callers observe
        // non-decreasing instants.
        let now = Instant::now();
        Self::admit_locked(&mut buckets, key, now, &self.policy)
    }

    /// [`admit`](Self::admit) against an explicit instant
    pub fn admit_at(&self, key: &K, now: Instant) -> bool {
        if !self.policy.enabled() {
            return true;
        }

        let mut buckets = lock(&self.buckets);
        Self::admit_locked(&mut buckets, key, now, &self.policy)
    }

    fn admit_locked(
        buckets: &mut HashMap<K, TokenBucket>,
        key: &K,
        now: Instant,
        policy: &RateLimitPolicy,
    ) -> bool {
        match buckets.get_mut(key) {
            Some(bucket) => bucket.try_acquire(now, policy),
            None => {
                let mut bucket = TokenBucket::full(policy.burst_capacity(), now);
                let admitted = bucket.try_acquire(now, policy);
                buckets.insert(key.clone(), bucket);
                admitted
            }
        }
    }

    /// Run one sweep pass against `now`, returning how many buckets were evicted
    pub fn sweep_at(&self, now: Instant) -> usize {
        sweep_buckets(&self.buckets, now, self.policy.idle_eviction_window())
    }

    /// Stop the sweep task. Safe to call more than once.
    pub fn stop(&self) {
        let task = self
            .sweep_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(task) = task {
            task.abort();
            tracing::info!(limiter = %self.name, "Rate limit sweep stopped");
        }
    }

    /// Whether the sweep task is still running
    pub fn is_sweeping(&self) -> bool {
        self.sweep_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Number of client keys currently holding a bucket
    pub fn tracked_clients(&self) -> usize {
        lock(&self.buckets).len()
    }

    /// Tokens currently held by `key`, without refilling
    pub fn available_tokens(&self, key: &K) -> Option<f64> {
        lock(&self.buckets).get(key).map(TokenBucket::available_tokens)
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<K> Drop for TokenBucketStore<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn drop(&mut self) {
        if let Some(task) = self
            .sweep_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

/// Bucket arithmetic cannot panic mid-update, so a poisoned map is still consistent
fn lock<K>(buckets: &BucketMap<K>) -> MutexGuard<'_, HashMap<K, TokenBucket>> {
    buckets.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sweep_buckets<K>(buckets: &BucketMap<K>, now: Instant, idle_window: Duration) -> usize
where
    K: Eq + Hash,
{
    let mut buckets = lock(buckets);
    let before = buckets.len();
    buckets.retain(|_, bucket| !bucket.is_idle(now, idle_window));
    before - buckets.len()
}

async fn sweep_loop<K>(
    name: String,
    buckets: BucketMap<K>,
    sweep_interval: Duration,
    idle_window: Duration,
) where
    K: Eq + Hash + Send + 'static,
{
    let mut interval = tokio::time::interval(sweep_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // First tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;

        let evicted = sweep_buckets(&buckets, Instant::now(), idle_window);
        let remaining = lock(&buckets).len();

        metrics::record_evicted(&name, evicted);
        metrics::set_tracked_clients(&name, remaining);

        if evicted > 0 {
            tracing::debug!(limiter = %name, evicted, remaining, "Swept idle rate limit buckets");
        }
    }
}
