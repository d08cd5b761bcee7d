//! Process-level Prometheus metrics, exposed at `GET /metrics` on the admin
//! port. Per-imposter rolling statistics live in `stats`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_int_gauge, CounterVec, Encoder, IntGauge, TextEncoder,
};

lazy_static! {
    /// Requests handled by imposter listeners
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "effigy_requests_total",
        "Total number of requests handled by imposters",
        &["method", "status"]
    )
    .unwrap();

    /// Upstream proxy attempts
    pub static ref PROXY_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "effigy_proxy_requests_total",
        "Total number of proxied requests",
        &["outcome"]  // outcome: ok|timeout|unreachable
    )
    .unwrap();

    /// Currently running imposter listeners
    pub static ref IMPOSTERS_RUNNING: IntGauge = register_int_gauge!(
        "effigy_imposters_running",
        "Number of imposters with a live listener"
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_request(method: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn record_proxy(outcome: &str) {
    PROXY_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn listener_started() {
    IMPOSTERS_RUNNING.inc();
}

pub fn listener_stopped() {
    IMPOSTERS_RUNNING.dec();
}
