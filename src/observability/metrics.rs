//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Name the proxy metrics in one place
//! - Record request, cache, upstream and hashing events
//! - Optionally expose a Prometheus scrape endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_cache_lookups_total` (counter): cache lookups by result
//! - `proxy_upstream_failures_total` (counter): transport failures by kind
//! - `proxy_streams_closed_total` (counter): streamed responses by outcome
//! - `proxy_hash_throughput_mib_s` (gauge): benchmark result per algorithm
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - Labels are low-cardinality; paths are never used as labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "proxy_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "proxy_request_duration_seconds";

/// Labels: `result` ("hit" | "miss").
pub const CACHE_LOOKUPS_TOTAL: &str = "proxy_cache_lookups_total";

/// Labels: `kind` (see `UpstreamError::kind`).
pub const UPSTREAM_FAILURES_TOTAL: &str = "proxy_upstream_failures_total";

/// Labels: `outcome` ("completed" | "failed" | "abandoned").
pub const STREAMS_CLOSED_TOTAL: &str = "proxy_streams_closed_total";

/// Labels: `algorithm`.
pub const HASH_THROUGHPUT_MIB_S: &str = "proxy_hash_throughput_mib_s";

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!(CACHE_LOOKUPS_TOTAL, "result" => result).increment(1);
}

pub fn record_upstream_failure(kind: &'static str) {
    metrics::counter!(UPSTREAM_FAILURES_TOTAL, "kind" => kind).increment(1);
}

pub fn record_stream_closed(outcome: &'static str) {
    metrics::counter!(STREAMS_CLOSED_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_hash_throughput(algorithm: &'static str, mib_per_sec: f64) {
    metrics::gauge!(HASH_THROUGHPUT_MIB_S, "algorithm" => algorithm).set(mib_per_sec);
}
