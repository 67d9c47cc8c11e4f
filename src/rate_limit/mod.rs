//! Per-Client Rate Limiting
//!
//! Token-bucket admission control in front of the dashboard API. Every
//! client key gets its own continuously refilling bucket; requests beyond
//! the bucket are rejected before any handler runs.
//!
//! # Features
//!
//! - Continuous-refill token bucket with instantaneous bursts
//! - Stricter derived limiter for authentication routes
//! - Background sweep that evicts buckets of idle clients
//! - axum middleware answering `429 Too Many Requests`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               rate_limit_middleware (axum)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐      ┌──────────────────────┐     │
//! │  │ RateLimiter "general"│      │ RateLimiter "auth"   │     │
//! │  │ policy from config   │      │ derived: rate/4,     │     │
//! │  │                      │      │ burst/2, floored     │     │
//! │  └──────────┬───────────┘      └──────────┬───────────┘     │
//! │  ┌──────────▼───────────┐      ┌──────────▼───────────┐     │
//! │  │ TokenBucketStore     │      │ TokenBucketStore     │     │
//! │  │ Mutex<HashMap> +sweep│      │ Mutex<HashMap> +sweep│     │
//! │  └──────────────────────┘      └──────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bucket;
pub mod config;
pub mod error;
pub mod limiter;
pub mod middleware;
pub mod store;

pub use bucket::TokenBucket;
pub use config::{AuthLimitConfig, RateLimitConfig, RateLimitPolicy};
pub use error::RateLimitError;
pub use limiter::{RateLimiter, RateLimiters, AUTH_LIMITER, GENERAL_LIMITER};
pub use middleware::{rate_limit_middleware, ClientKeyExtractor, RateLimitLayerState};
pub use store::TokenBucketStore;
