//! Admission Middleware
//!
//! axum middleware placed in front of route groups. It resolves the client
//! key, asks the limiter, and answers `429 Too Many Requests` without
//! running the inner handler when the client is over its limit.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use super::limiter::RateLimiter;

/// How the boundary derives a client key from a request
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientKeyExtractor {
    /// Prefer the first `X-Forwarded-For` entry over the peer address
    pub trust_forwarded_for: bool,
}

impl ClientKeyExtractor {
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            trust_forwarded_for,
        }
    }

    /// Resolve the client address, `None` when the request carries none
    pub fn client_key(&self, request: &Request) -> Option<IpAddr> {
        if self.trust_forwarded_for {
            let forwarded = request
                .headers()
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .and_then(|first| first.trim().parse::<IpAddr>().ok());

            if forwarded.is_some() {
                return forwarded;
            }
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    }
}

/// State handed to [`rate_limit_middleware`] via `from_fn_with_state`
#[derive(Debug, Clone)]
pub struct RateLimitLayerState {
    pub limiter: Arc<RateLimiter>,
    pub extractor: ClientKeyExtractor,
}

impl RateLimitLayerState {
    pub fn new(limiter: Arc<RateLimiter>, extractor: ClientKeyExtractor) -> Self {
        Self { limiter, extractor }
    }
}

/// Admit or reject a request before it reaches its handler
pub async fn rate_limit_middleware(
    State(state): State<RateLimitLayerState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(client) = state.extractor.client_key(&request) else {
        // Unknown peers are not pooled into one shared bucket
        tracing::debug!(
            limiter = state.limiter.name(),
            "No client address on request, skipping rate limit"
        );
        return next.run(request).await;
    };

    if state.limiter.check_and_admit(&client) {
        next.run(request).await
    } else {
        too_many_requests(&state.limiter)
    }
}

fn too_many_requests(limiter: &RateLimiter) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": "rate limit exceeded" })),
    )
        .into_response();

    if let Some(interval) = limiter.policy().token_interval() {
        let secs = interval.as_secs_f64().ceil().max(1.0) as u64;
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }

    response
}
