//! Prometheus metrics for the Tessera server.
//!
//! This module owns the exporter and the HTTP-level recording helpers.
//! Domain modules (session cache tiers, backend retries, state transitions)
//! emit their counters directly through the `metrics` macros; everything
//! lands in the recorder installed here and is rendered by `GET /metrics`.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "tessera_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "tessera_http_request_duration_seconds";

    pub const SESSION_CACHE_ENTRIES: &str = "tessera_session_cache_entries";
    pub const ROTATION_RECORDS: &str = "tessera_session_rotation_records";
}

/// Initialize the Prometheus metrics exporter.
///
/// Called once at server startup. Returns `true` if initialization
/// succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: we serve /metrics ourselves.
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("failed to store Prometheus handle (already set)");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

/// Record an HTTP request.
///
/// `route` must be the matched route template, not the raw path, so label
/// cardinality stays bounded.
pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string(),
        "status_class" => status_class(status)
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Gauge the in-process session cache size by tier.
pub fn set_session_cache_entries(tier: &str, count: usize) {
    gauge!(names::SESSION_CACHE_ENTRIES, "tier" => tier.to_string()).set(count as f64);
}

/// Gauge the number of live rotation records.
pub fn set_rotation_records(count: usize) {
    gauge!(names::ROTATION_RECORDS).set(count as f64);
}

fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_class_buckets() {
        assert_eq!(status_class(200), "2xx");
        assert_eq!(status_class(204), "2xx");
        assert_eq!(status_class(302), "3xx");
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(503), "5xx");
        assert_eq!(status_class(100), "other");
    }
}
