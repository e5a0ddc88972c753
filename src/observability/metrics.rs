//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): requests by method, status, mode
//! - `bridge_request_duration_seconds` (histogram): latency distribution
//! - `bridge_active_sessions` (gauge): current streaming sessions
//! - `bridge_frames_total` (counter): relayed frames by direction
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Labels stay low-cardinality (no paths, no IDs)

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter on `addr`. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, mode: &'static str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("mode", mode.to_string()),
    ];
    ::metrics::counter!("bridge_requests_total", &labels).increment(1);
    ::metrics::histogram!("bridge_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn set_active_sessions(count: usize) {
    ::metrics::gauge!("bridge_active_sessions").set(count as f64);
}

/// Record one relayed frame. `direction` is `upstream` or `downstream`.
pub fn record_frame(direction: &'static str) {
    ::metrics::counter!("bridge_frames_total", "direction" => direction).increment(1);
}
