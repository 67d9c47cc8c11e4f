//! QueryDeck Admission Control
//!
//! Per-client token-bucket rate limiting for the QueryDeck SQL dashboard
//! API, the axum boundary that enforces it, and the configuration, logging
//! and metrics plumbing around them.

pub mod config;
pub mod metrics;
pub mod rate_limit;
pub mod server;
