//! Axum middleware that times every request and feeds the event recorder.
//!
//! Requests to the metrics, health and export endpoints are only counted in
//! Prometheus; they are kept out of the recorder so that polling the
//! statistics does not change them.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use testbed_core::RequestSample;

use super::Telemetry;

/// Path prefixes whose requests never become request samples.
const UNRECORDED_PREFIXES: &[&str] = &["/metrics", "/health"];

/// Whether a request to `path` is part of the measured workload.
pub fn is_recorded(path: &str) -> bool {
    !UNRECORDED_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Replace numeric path segments with `{id}` to bound label cardinality.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Request-recording middleware.
pub async fn record_request_middleware(
    State(telemetry): State<Telemetry>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    if is_recorded(&path) {
        telemetry.record_request(RequestSample::new(
            method.as_str(),
            path.as_str(),
            duration_ms,
            status,
        ));
    } else {
        telemetry.metrics.record_http_request(
            method.as_str(),
            &normalize_path(&path),
            status,
            duration_ms / 1000.0,
        );
    }

    tracing::debug!(
        method = %method,
        path = %path,
        status,
        duration_ms,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_numeric_id() {
        assert_eq!(normalize_path("/users/12345/dashboard"), "/users/{id}/dashboard");
        assert_eq!(normalize_path("/recommendations/7"), "/recommendations/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/products"), "/products");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/v2/items"), "/v2/items");
    }

    #[test]
    fn test_metrics_and_health_are_not_recorded() {
        assert!(!is_recorded("/metrics"));
        assert!(!is_recorded("/metrics/export"));
        assert!(!is_recorded("/health/ready"));
        assert!(is_recorded("/products"));
        assert!(is_recorded("/checkout"));
        assert!(is_recorded("/metricsx"));
    }
}
