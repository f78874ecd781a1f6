//! Recommendations route, served through the lookup cache.

use axum::{extract::State, response::Response, routing::get, Router};
use testbed_core::UserId;

use super::json_bytes;
use crate::error::ApiResult;
use crate::extractors::ApiPath;
use crate::services::Services;
use crate::state::AppState;
use crate::validation::ValidateRange;

/// GET /recommendations/:user_id
pub async fn get_recommendations(
    State(services): State<Services>,
    ApiPath(user_id): ApiPath<UserId>,
) -> ApiResult<Response> {
    user_id.validate_positive("userId")?;
    let body = services.lookup.recommendations(user_id).await?;
    Ok(json_bytes(body))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/:user_id", get(get_recommendations))
}
