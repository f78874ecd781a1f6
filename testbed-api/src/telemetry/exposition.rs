//! Prometheus Metrics Definitions
//!
//! Collectors live in an owned `Registry` held by the application state, so
//! tests can build as many independent instances as they like.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Container for all testbed collectors.
#[derive(Clone)]
pub struct TestbedMetrics {
    registry: Registry,

    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Cache lookups - labels: result (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// Checkouts - labels: strategy, status (success/error)
    pub checkouts_total: CounterVec,
}

fn register_err(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl TestbedMetrics {
    /// Create all collectors and register them with a fresh registry.
    pub fn new() -> ApiResult<Self> {
        let registry = Registry::new_custom(Some("testbed".to_string()), None)
            .map_err(|e| register_err("registry", e))?;

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )
        .map_err(|e| register_err("http_requests_total", e))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(HTTP_LATENCY_BUCKETS.to_vec()),
            &["method", "path"],
        )
        .map_err(|e| register_err("http_request_duration_seconds", e))?;

        let cache_lookups_total = CounterVec::new(
            Opts::new("cache_lookups_total", "Cached lookups by result"),
            &["result"],
        )
        .map_err(|e| register_err("cache_lookups_total", e))?;

        let checkouts_total = CounterVec::new(
            Opts::new("checkouts_total", "Checkouts by write strategy and outcome"),
            &["strategy", "status"],
        )
        .map_err(|e| register_err("checkouts_total", e))?;

        registry
            .register(Box::new(http_requests_total.clone()))
            .map_err(|e| register_err("http_requests_total", e))?;
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .map_err(|e| register_err("http_request_duration_seconds", e))?;
        registry
            .register(Box::new(cache_lookups_total.clone()))
            .map_err(|e| register_err("cache_lookups_total", e))?;
        registry
            .register(Box::new(checkouts_total.clone()))
            .map_err(|e| register_err("checkouts_total", e))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            cache_lookups_total,
            checkouts_total,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    pub fn record_checkout(&self, strategy: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.checkouts_total
            .with_label_values(&[strategy, status])
            .inc();
    }

    /// Text exposition of every registered collector.
    pub fn encode(&self) -> ApiResult<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ApiError::internal_error(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}

/// Handler for GET /metrics/prometheus.
pub async fn prometheus_handler(State(metrics): State<Arc<TestbedMetrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.message.into_bytes(),
            )
        }
    }
}
