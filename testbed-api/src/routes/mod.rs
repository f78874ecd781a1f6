//! REST API Routes Module
//!
//! Measured endpoints (products, dashboards, recommendations, checkout)
//! plus the metrics and health endpoints, assembled into one router with:
//! - a per-request deadline (504 on expiry)
//! - the request-recording middleware
//! - HTTP tracing and CORS

pub mod checkout;
pub mod health;
pub mod metrics;
pub mod products;
pub mod recommendations;
pub mod users;

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    Router,
};
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::error::handle_middleware_error;
use crate::state::AppState;
use crate::telemetry::record_request_middleware;

pub use checkout::create_router as checkout_router;
pub use health::create_router as health_router;
pub use metrics::create_router as metrics_router;
pub use products::create_router as products_router;
pub use recommendations::create_router as recommendations_router;
pub use users::create_router as users_router;

/// Respond with already-serialized JSON.
pub(crate) fn json_bytes(body: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response()
}

/// Build the CORS layer from ApiConfig.
///
/// Empty origins allow every origin.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    if config.cors_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Create the complete router.
///
/// Layer order, outermost first: CORS, tracing, request recording, error
/// mapping, deadline. Recording sits outside the deadline so that timed-out
/// requests are sampled with their 504.
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let recording = from_fn_with_state(state.telemetry.clone(), record_request_middleware);

    Router::new()
        .nest("/products", products::create_router())
        .nest("/users", users::create_router())
        .nest("/recommendations", recommendations::create_router())
        .nest("/checkout", checkout::create_router())
        .nest("/metrics", metrics::create_router())
        .nest("/health", health::create_router())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(config.request_timeout)),
        )
        .layer(recording)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(config))
        .with_state(state)
}
