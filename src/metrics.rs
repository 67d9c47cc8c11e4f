// Prometheus metrics for QueryDeck admission control
//
// Exposes metrics on the /metrics HTTP endpoint:
// - Admitted and rejected requests per limiter (counter)
// - Idle buckets evicted by the sweep (counter)
// - Client keys currently tracked (gauge)

use lazy_static::lazy_static;
use prometheus::{core::Collector, Encoder, IntCounterVec, IntGaugeVec, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref RATE_LIMIT_ADMITTED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("rate_limit_admitted_total", "Requests admitted by the rate limiter"),
        &["limiter"]
    ).expect("Failed to create admitted requests metric");

    pub static ref RATE_LIMIT_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("rate_limit_rejected_total", "Requests rejected by the rate limiter"),
        &["limiter"]
    ).expect("Failed to create rejected requests metric");

    pub static ref RATE_LIMIT_EVICTED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("rate_limit_evicted_total", "Idle client buckets evicted by the sweep"),
        &["limiter"]
    ).expect("Failed to create evicted buckets metric");

    pub static ref RATE_LIMIT_TRACKED_CLIENTS: IntGaugeVec = IntGaugeVec::new(
        prometheus::Opts::new("rate_limit_tracked_clients", "Client keys currently holding a bucket"),
        &["limiter"]
    ).expect("Failed to create tracked clients metric");
}

/// Register all metrics with the registry.
///
/// Collectors already registered by an earlier call are left in place.
pub fn init() -> prometheus::Result<()> {
    register(Box::new(RATE_LIMIT_ADMITTED_TOTAL.clone()))?;
    register(Box::new(RATE_LIMIT_REJECTED_TOTAL.clone()))?;
    register(Box::new(RATE_LIMIT_EVICTED_TOTAL.clone()))?;
    register(Box::new(RATE_LIMIT_TRACKED_CLIENTS.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn Collector>) -> prometheus::Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

pub fn record_admitted(limiter: &str) {
    RATE_LIMIT_ADMITTED_TOTAL.with_label_values(&[limiter]).inc();
}

pub fn record_rejected(limiter: &str) {
    RATE_LIMIT_REJECTED_TOTAL.with_label_values(&[limiter]).inc();
}

pub fn record_evicted(limiter: &str, count: usize) {
    RATE_LIMIT_EVICTED_TOTAL
        .with_label_values(&[limiter])
        .inc_by(count as u64);
}

pub fn set_tracked_clients(limiter: &str, count: usize) {
    RATE_LIMIT_TRACKED_CLIENTS
        .with_label_values(&[limiter])
        .set(count as i64);
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
