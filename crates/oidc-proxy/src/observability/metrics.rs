//! Metrics definitions for the OIDC proxy.
//!
//! All metrics follow Prometheus naming conventions:
//! - `proxy_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `outcome`: one value per `ProxyError` variant plus `tunnel` and `ping`
//! - `status`: `success`, `error`
//! - `direction`: `upstream`, `downstream`
//!
//! Claim values and hosts are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Build the Prometheus recorder with the proxy's histogram buckets.
fn builder() -> Result<PrometheusBuilder, String> {
    PrometheusBuilder::new()
        // Request decisions include one key-set fetch in the worst case
        .set_buckets_for_metric(
            Matcher::Full("proxy_request_duration_seconds".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set request duration buckets: {e}"))
}

/// Install the Prometheus recorder together with its own scrape listener on
/// `address`. Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns error if the recorder or listener cannot be installed.
pub fn init_metrics_exporter(address: SocketAddr) -> Result<(), String> {
    builder()?
        .with_http_listener(address)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))
}

// ============================================================================
// Request Metrics
// ============================================================================

/// Record the final decision for one inbound request.
///
/// Metric: `proxy_requests_total`, `proxy_request_duration_seconds`
/// Labels: `outcome`
///
/// The duration covers the decision only: for tunnels it stops when the
/// 200 response is produced, not when the session ends.
pub fn record_request(outcome: &'static str, duration: Duration) {
    histogram!("proxy_request_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());

    counter!("proxy_requests_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Key Set Metrics
// ============================================================================

/// Record one key-set fetch attempt.
///
/// Metric: `proxy_jwks_fetch_total`
/// Labels: `status`
pub fn record_jwks_fetch(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("proxy_jwks_fetch_total", "status" => status).increment(1);
}

// ============================================================================
// Tunnel Metrics
// ============================================================================

/// Track an established tunnel.
///
/// Metric: `proxy_active_tunnels`
pub fn tunnel_opened() {
    gauge!("proxy_active_tunnels").increment(1.0);
}

/// Record the end of a tunnel session.
///
/// Metric: `proxy_active_tunnels`, `proxy_tunnel_bytes_total`
/// Labels: `direction`
pub fn tunnel_closed(upstream_bytes: u64, downstream_bytes: u64) {
    gauge!("proxy_active_tunnels").decrement(1.0);

    counter!("proxy_tunnel_bytes_total", "direction" => "upstream").increment(upstream_bytes);
    counter!("proxy_tunnel_bytes_total", "direction" => "downstream")
        .increment(downstream_bytes);
}
