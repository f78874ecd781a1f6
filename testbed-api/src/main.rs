//! Testbed API Server Entry Point
//!
//! Resolves the mode and server configuration, connects the data store,
//! and serves until SIGINT/SIGTERM. Recorded metrics are exported once on
//! the way out.

use std::sync::Arc;

use testbed_api::telemetry::{init_tracer, TelemetryConfig};
use testbed_api::{build_app, ApiConfig, ApiError, ApiResult, DbConfig, ExportGuard, PgStore, StoreBackend};
use testbed_core::{EventRecorder, ModeConfig};
use testbed_storage::{CacheBackend, CatalogSeed, DataStore, InMemoryCacheBackend, MockStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let mode = ModeConfig::from_env()?;
    let api_config = ApiConfig::from_env()?;
    let recorder = Arc::new(EventRecorder::new());

    let store: Arc<dyn DataStore> = match api_config.store {
        StoreBackend::Postgres => {
            let db_config = DbConfig::from_env()?;
            Arc::new(PgStore::from_config(&db_config, recorder.clone())?)
        }
        StoreBackend::Memory => {
            let store = MockStore::new().with_recorder(recorder.clone());
            store.seed(CatalogSeed::default())?;
            Arc::new(store)
        }
    };
    let cache: Arc<dyn CacheBackend> = Arc::new(InMemoryCacheBackend::new());

    tracing::info!(
        mode = mode.name(),
        capabilities = ?mode.capabilities(),
        overrides = mode.has_overrides(),
        store = store.backend_name(),
        "Mode resolved"
    );

    let (state, app) = build_app(mode, &api_config, store, cache, recorder)?;
    let export_guard = ExportGuard::new(state.exporter.clone());

    let addr = api_config.bind_addr()?;
    tracing::info!(%addr, "Starting testbed API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    match export_guard.flush() {
        Some(Ok(path)) => tracing::info!(path = %path.display(), "Final metrics exported"),
        Some(Err(e)) => tracing::error!(error = %e, "Final metrics export failed"),
        None => {}
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
