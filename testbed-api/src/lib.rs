//! Testbed API - Measured HTTP Service
//!
//! Axum service that runs in baseline or optimized mode and measures the
//! difference. It exposes four measured endpoints (product search, user
//! dashboard, recommendations, checkout) whose data access is chosen once
//! from the resolved `ModeConfig`, plus metrics, export and health
//! endpoints fed by the event recorder.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
mod macros;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod validation;

use std::sync::Arc;

use axum::Router;
use testbed_core::{EventRecorder, ModeConfig};
use testbed_storage::{CacheBackend, DataStore};

pub use config::{ApiConfig, StoreBackend};
pub use db::{DbConfig, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;
pub use services::Services;
pub use state::AppState;
pub use telemetry::{ExportGuard, MetricsExporter, Telemetry};
pub use types::*;
pub use validation::{CheckoutItem, CheckoutRequest};

/// Wire services, telemetry and the exporter into shared state.
///
/// `recorder` must be the same recorder the store reports its queries to.
pub fn build_state(
    mode: ModeConfig,
    config: &ApiConfig,
    store: Arc<dyn DataStore>,
    cache: Arc<dyn CacheBackend>,
    recorder: Arc<EventRecorder>,
) -> ApiResult<AppState> {
    let telemetry = Telemetry::new(recorder.clone())?;
    let services = Services::build(&mode, store, cache, config.cache_ttl, telemetry.clone());
    let exporter = MetricsExporter::new(config.results_dir.clone(), mode.name(), recorder);
    Ok(AppState::new(mode, services, telemetry, exporter))
}

/// Build state and router in one step.
pub fn build_app(
    mode: ModeConfig,
    config: &ApiConfig,
    store: Arc<dyn DataStore>,
    cache: Arc<dyn CacheBackend>,
    recorder: Arc<EventRecorder>,
) -> ApiResult<(AppState, Router)> {
    let state = build_state(mode, config, store, cache, recorder)?;
    let router = create_router(state.clone(), config);
    Ok((state, router))
}
