//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, admission, breaker state)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-service and aggregate metrics
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, service, outcome
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): requests rejected by the rate limiter
//! - `gateway_rate_limiter_clients` (gauge): tracked client buckets
//! - `gateway_circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_circuit_breaker_rejections_total` (counter): calls refused by an open circuit
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Histogram buckets tuned for typical web latencies

use std::net::SocketAddr;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tokio::time::Instant;

use crate::http::outcome::Outcome;
use crate::resilience::CircuitState;

const REQUEST_DURATION: &str = "gateway_request_duration_seconds";

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = match PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), LATENCY_BUCKETS)
    {
        Ok(builder) => builder,
        Err(e) => {
            tracing::error!(error = %e, "Invalid metrics histogram configuration");
            return;
        }
    };

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one finished request.
pub fn record_request(method: &str, status: u16, service: &str, outcome: &Outcome, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "service" => service.to_string(),
        "outcome" => outcome.label(),
    )
    .increment(1);

    ::metrics::histogram!(
        REQUEST_DURATION,
        "method" => method.to_string(),
        "service" => service.to_string(),
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    ::metrics::counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_rate_limiter_clients(clients: usize) {
    ::metrics::gauge!("gateway_rate_limiter_clients").set(clients as f64);
}

pub fn record_breaker_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    ::metrics::gauge!("gateway_circuit_breaker_state", "service" => service.to_string()).set(value);
}

pub fn record_breaker_rejection(service: &str) {
    ::metrics::counter!(
        "gateway_circuit_breaker_rejections_total",
        "service" => service.to_string(),
    )
    .increment(1);
}
