//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "keepsake_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "keepsake_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "keepsake_http_requests_in_flight";

    // Quota decisions
    pub const QUOTA_CHECKS_TOTAL: &str = "keepsake_quota_checks_total";

    // Billing webhook events
    pub const WEBHOOK_EVENTS_TOTAL: &str = "keepsake_webhook_events_total";

    // Rate limiting
    pub const RATE_LIMIT_HITS_TOTAL: &str = "keepsake_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a quota decision by dimension and outcome.
pub fn record_quota_check(dimension: &str, allowed: bool) {
    let labels = [
        ("dimension", dimension.to_string()),
        ("allowed", allowed.to_string()),
    ];
    counter!(names::QUOTA_CHECKS_TOTAL, &labels).increment(1);
}

/// Record a processed webhook event.
pub fn record_webhook_event(event_type: &str, outcome: &str) {
    let labels = [
        ("event_type", event_type.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::WEBHOOK_EVENTS_TOTAL, &labels).increment(1);
}

/// Record a rate limit rejection.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Sanitize path for metrics labels (replace ids with placeholders).
fn sanitize_path(path: &str) -> String {
    let path = regex_lite::Regex::new(
        r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
    )
    .unwrap()
    .replace_all(path, ":id");
    let path = regex_lite::Regex::new(r"/[0-9]+(/|$)")
        .unwrap()
        .replace_all(&path, "/:id$1");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path_replaces_uuids() {
        assert_eq!(
            sanitize_path("/api/stories/8c1f8f9a-1234-4abc-9def-0123456789ab"),
            "/api/stories/:id"
        );
    }

    #[test]
    fn test_sanitize_path_replaces_numeric_ids() {
        assert_eq!(sanitize_path("/api/stories/42"), "/api/stories/:id");
    }

    #[test]
    fn test_sanitize_path_keeps_static_routes() {
        assert_eq!(sanitize_path("/api/subscription"), "/api/subscription");
    }
}
