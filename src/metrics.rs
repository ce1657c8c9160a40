//! Prometheus metrics for the fetch layer
//!
//! Counters and histograms registered in the default registry. `encode_metrics`
//! renders them in the Prometheus text format for `--emit-metrics` or
//! an embedding service's scrape endpoint.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    /// Counter: cache lookups on the fetch path by result (hit/miss/stale_fallback)
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec!(
        "sheetcache_cache_operations_total",
        "Cache lookups on the fetch path by result",
        &["result"]
    )
    .expect("Failed to create cache_operations metric");

    /// Counter: swallowed cache backend failures by operation
    pub static ref CACHE_ERRORS: CounterVec = register_counter_vec!(
        "sheetcache_cache_errors_total",
        "Cache backend failures by operation",
        &["operation"]
    )
    .expect("Failed to create cache_errors metric");

    /// Counter: transport calls by outcome (ok/rate_limited/transport/auth/malformed)
    pub static ref TRANSPORT_CALLS: CounterVec = register_counter_vec!(
        "sheetcache_transport_calls_total",
        "Batched range-read calls by outcome",
        &["outcome"]
    )
    .expect("Failed to create transport_calls metric");

    /// Gauge: current backoff multiplier
    pub static ref BACKOFF_MULTIPLIER: Gauge = register_gauge!(
        "sheetcache_backoff_multiplier",
        "Current rate limiter backoff multiplier"
    )
    .expect("Failed to create backoff_multiplier metric");

    /// Histogram: end-to-end fetch duration by result (seconds)
    pub static ref FETCH_DURATION: HistogramVec = register_histogram_vec!(
        "sheetcache_fetch_duration_seconds",
        "Duration of fetch operations",
        &["result"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to create fetch_duration metric");
}

/// Record a fresh cache hit
pub fn record_cache_hit() {
    CACHE_OPERATIONS.with_label_values(&["hit"]).inc();
}

/// Record a cache miss (absent or stale entry)
pub fn record_cache_miss() {
    CACHE_OPERATIONS.with_label_values(&["miss"]).inc();
}

/// Record a stale entry served as fallback
pub fn record_stale_fallback() {
    CACHE_OPERATIONS.with_label_values(&["stale_fallback"]).inc();
}

/// Record a swallowed backend failure
pub fn record_cache_error(operation: &str) {
    CACHE_ERRORS.with_label_values(&[operation]).inc();
}

/// Record a transport call outcome
pub fn record_transport_call(outcome: &str) {
    TRANSPORT_CALLS.with_label_values(&[outcome]).inc();
}

/// Set the current backoff multiplier
pub fn set_backoff_multiplier(multiplier: u32) {
    BACKOFF_MULTIPLIER.set(multiplier as f64);
}

/// Record a fetch duration
pub fn record_fetch_duration(result: &str, duration_secs: f64) {
    FETCH_DURATION
        .with_label_values(&[result])
        .observe(duration_secs);
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        record_cache_hit();
        record_cache_miss();
        record_stale_fallback();
        record_cache_error("write");
        record_transport_call("ok");
        set_backoff_multiplier(4);
        record_fetch_duration("fresh", 0.25);
    }

    #[test]
    fn test_encode_metrics() {
        record_transport_call("rate_limited");

        let output = encode_metrics();
        assert!(output.contains("sheetcache_transport_calls_total"));
    }
}
