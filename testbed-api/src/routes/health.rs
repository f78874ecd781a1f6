//! Health Check Endpoints
//!
//! - /health - liveness with the active mode and capabilities
//! - /health/ready - data store connectivity check (503 when unreachable)

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use testbed_core::HealthCheck;

use crate::state::AppState;
use crate::types::{HealthResponse, ReadyResponse};

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        mode: state.mode.name().to_string(),
        capabilities: state.mode.capabilities(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// GET /health/ready
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let store = &state.services.store;
    let start = Instant::now();

    let check = match store.ping().await {
        Ok(()) => HealthCheck::healthy(store.backend_name())
            .with_response_time(start.elapsed().as_millis() as u64),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            HealthCheck::unhealthy(store.backend_name(), e.to_string())
        }
    };

    let (status_code, status) = if check.is_healthy() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        status_code,
        Json(ReadyResponse {
            status: status.to_string(),
            store: check,
        }),
    )
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/ready", get(readiness))
}
