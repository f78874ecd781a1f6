//! Request and response types for the HTTP surface.

use serde::{Deserialize, Serialize};
use testbed_core::{Capabilities, HealthCheck, Product, StatsSnapshot};

/// Query string of `GET /products`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub search: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSearchResponse {
    pub products: Vec<Product>,
    pub count: usize,
    /// Set only when the results are paginated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Body of `GET /metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub requests: u64,
    pub errors: u64,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub cache_hit_ratio: f64,
}

impl From<StatsSnapshot> for MetricsSummary {
    fn from(stats: StatsSnapshot) -> Self {
        Self {
            requests: stats.request_count,
            errors: stats.error_count,
            avg_ms: stats.avg_latency_ms,
            p95_ms: stats.p95_latency_ms,
            cache_hit_ratio: stats.cache_hit_ratio_percent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub reset: bool,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: String,
    pub capabilities: Capabilities,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Body of `GET /health/ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub status: String,
    pub store: HealthCheck,
}
