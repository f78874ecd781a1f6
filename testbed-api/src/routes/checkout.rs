//! Checkout route.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use testbed_core::OrderReceipt;

use crate::error::ApiResult;
use crate::extractors::ApiJson;
use crate::services::Services;
use crate::state::AppState;
use crate::validation::CheckoutRequest;

/// POST /checkout
pub async fn checkout(
    State(services): State<Services>,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<OrderReceipt>)> {
    let receipt = services.checkout.checkout(&request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", post(checkout))
}
