// Prometheus counters for backend calls and loop iterations
//
// Counters are process-wide; each server builds its own Registry and
// registers them so /metrics exposes them.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub static API_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("looper_api_requests_total", "Chat-completion requests by outcome"),
        &["outcome"],
    )
    .expect("static metric definition is valid")
});

pub static ITERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("looper_iterations_total", "Loop iterations by outcome"),
        &["outcome"],
    )
    .expect("static metric definition is valid")
});

pub fn record_api_request(outcome: &str) {
    API_REQUESTS.with_label_values(&[outcome]).inc();
}

pub fn record_iteration(outcome: &str) {
    ITERATIONS.with_label_values(&[outcome]).inc();
}

/// Registry carrying every looper counter
pub fn new_registry() -> prometheus::Result<Registry> {
    let registry = Registry::new();
    registry.register(Box::new(API_REQUESTS.clone()))?;
    registry.register(Box::new(ITERATIONS.clone()))?;
    Ok(registry)
}

/// Text exposition format
pub fn encode(registry: &Registry) -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
