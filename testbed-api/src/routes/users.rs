//! User dashboard route.

use axum::{extract::State, response::Response, routing::get, Router};
use testbed_core::UserId;

use super::json_bytes;
use crate::error::ApiResult;
use crate::extractors::ApiPath;
use crate::services::Services;
use crate::state::AppState;
use crate::validation::ValidateRange;

/// GET /users/:id/dashboard
pub async fn get_dashboard(
    State(services): State<Services>,
    ApiPath(user_id): ApiPath<UserId>,
) -> ApiResult<Response> {
    user_id.validate_positive("id")?;
    let body = services.lookup.dashboard(user_id).await?;
    Ok(json_bytes(body))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/:id/dashboard", get(get_dashboard))
}
