//! Metrics Endpoints
//!
//! - GET /metrics - summary in the fixed five-field shape
//! - GET /metrics/snapshot - every aggregated statistic
//! - GET /metrics/prometheus - text exposition
//! - POST /metrics/export - write a CSV export
//! - POST /metrics/reset - clear recorded samples and counters
//!
//! None of these requests are recorded as samples themselves.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use testbed_core::{EventRecorder, StatsSnapshot};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::telemetry::{prometheus_handler, MetricsExporter};
use crate::types::{ExportResponse, MetricsSummary, ResetResponse};

/// GET /metrics
pub async fn summary(State(recorder): State<Arc<EventRecorder>>) -> Json<MetricsSummary> {
    Json(recorder.compute_stats().into())
}

/// GET /metrics/snapshot
pub async fn snapshot(State(recorder): State<Arc<EventRecorder>>) -> Json<StatsSnapshot> {
    Json(recorder.compute_stats())
}

/// POST /metrics/export
pub async fn export(State(exporter): State<MetricsExporter>) -> ApiResult<Json<ExportResponse>> {
    let path = tokio::task::spawn_blocking(move || exporter.export())
        .await
        .map_err(|e| ApiError::internal_error(format!("Export task failed: {}", e)))??;

    Ok(Json(ExportResponse {
        path: path.display().to_string(),
    }))
}

/// POST /metrics/reset
pub async fn reset(State(recorder): State<Arc<EventRecorder>>) -> Json<ResetResponse> {
    recorder.reset();
    tracing::info!("Recorder reset");
    Json(ResetResponse { reset: true })
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(summary))
        .route("/snapshot", get(snapshot))
        .route("/prometheus", get(prometheus_handler))
        .route("/export", post(export))
        .route("/reset", post(reset))
}
