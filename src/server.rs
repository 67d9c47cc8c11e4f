// HTTP boundary for the QueryDeck API
//
// /health and /metrics are served outside the rate limiters.
// /api/* passes the general limiter; /auth/* passes the general limiter
// and then the stricter auth limiter.

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::metrics;
use crate::rate_limit::{
    rate_limit_middleware, ClientKeyExtractor, RateLimitLayerState, RateLimiters,
};

/// Build the router with both limiters in place
pub fn build_router(
    limiters: &RateLimiters,
    extractor: ClientKeyExtractor,
    metrics_enabled: bool,
) -> Router {
    let general = RateLimitLayerState::new(limiters.general.clone(), extractor);
    let auth = RateLimitLayerState::new(limiters.auth.clone(), extractor);

    let api = Router::new().route("/status", get(api_status_handler));

    let auth_routes = Router::new()
        .route("/session", post(auth_session_handler))
        .layer(from_fn_with_state(auth, rate_limit_middleware));

    let mut app = Router::new()
        .nest("/api", api)
        .nest("/auth", auth_routes)
        .layer(from_fn_with_state(general, rate_limit_middleware))
        .route("/health", get(health_handler));

    if metrics_enabled {
        let limiters = limiters.clone();
        app = app.route(
            "/metrics",
            get(move || {
                let limiters = limiters.clone();
                async move {
                    limiters.refresh_gauges();
                    metrics_handler().await
                }
            }),
        );
    }

    app.layer(TraceLayer::new_for_http())
}

/// Start the API server and run until Ctrl-C
pub async fn serve(config: &Config) -> Result<()> {
    if config.metrics.enabled {
        metrics::init().context("Failed to initialize metrics")?;
    }

    let limiters = RateLimiters::from_config(&config.rate_limit)
        .context("Failed to build rate limiters")?;
    let extractor = ClientKeyExtractor::new(config.rate_limit.trust_forwarded_for);
    let app = build_router(&limiters, extractor, config.metrics.enabled);

    let addr = config.bind_addr()?;
    info!("Starting QueryDeck API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("API server error")?;

    limiters.stop();
    info!("QueryDeck API stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn api_status_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn auth_session_handler() -> impl IntoResponse {
    Json(json!({ "status": "accepted" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimitConfig;
    use axum::{body::Body, extract::ConnectInfo, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn limiters(rpm: u32, burst: u32) -> RateLimiters {
        RateLimiters::from_config(&RateLimitConfig {
            requests_per_minute: rpm,
            burst_size: burst,
            ..RateLimitConfig::default()
        })
        .unwrap()
    }

    fn request(method: &str, uri: &str, peer: &str) -> Request<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        request
    }

    #[tokio::test]
    async fn test_health_is_not_rate_limited() {
        let limiters = limiters(60, 1);
        let app = build_router(&limiters, ClientKeyExtractor::default(), false);

        for _ in 0..10 {
            let response = app
                .clone()
                .oneshot(request("GET", "/health", "10.1.0.1:1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(limiters.general.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn test_api_uses_general_limiter() {
        let limiters = limiters(60, 3);
        let app = build_router(&limiters, ClientKeyExtractor::default(), false);

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(request("GET", "/api/status", "10.1.0.2:1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(request("GET", "/api/status", "10.1.0.2:1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limiters.auth.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn test_auth_routes_throttled_harder() {
        // General burst 10, auth burst 5
        let limiters = limiters(60, 10);
        let app = build_router(&limiters, ClientKeyExtractor::default(), false);

        let mut statuses = Vec::new();
        for _ in 0..6 {
            let response = app
                .clone()
                .oneshot(request("POST", "/auth/session", "10.1.0.3:1"))
                .await
                .unwrap();
            statuses.push(response.status());
        }

        assert!(statuses[..5].iter().all(|s| *s == StatusCode::OK));
        assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);

        // The general limiter still admits API traffic from the same client
        let response = app
            .oneshot(request("GET", "/api/status", "10.1.0.3:1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        metrics::init().unwrap();
        let limiters = limiters(60, 5);
        let app = build_router(&limiters, ClientKeyExtractor::default(), true);

        app.clone()
            .oneshot(request("GET", "/api/status", "10.1.0.4:1"))
            .await
            .unwrap();

        let response = app
            .oneshot(request("GET", "/metrics", "10.1.0.4:1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("rate_limit_admitted_total"));
        assert!(text.contains("rate_limit_tracked_clients"));
    }

    #[tokio::test]
    async fn test_metrics_route_absent_when_disabled() {
        let limiters = limiters(60, 5);
        let app = build_router(&limiters, ClientKeyExtractor::default(), false);

        let response = app
            .oneshot(request("GET", "/metrics", "10.1.0.5:1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
