//! Product search route.

use axum::{extract::State, routing::get, Json, Router};
use testbed_storage::Page;

use crate::error::ApiResult;
use crate::extractors::ApiQuery;
use crate::services::Services;
use crate::state::AppState;
use crate::types::{ProductSearchResponse, SearchParams};

/// GET /products?search=&page=&limit=
///
/// The batched read path returns one page; the baseline path ignores the
/// page and returns every match.
pub async fn search_products(
    State(services): State<Services>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> ApiResult<Json<ProductSearchResponse>> {
    let page = Page::new(params.page, params.limit);
    let products = services
        .search
        .search(services.store.as_ref(), params.search.trim(), page)
        .await?;

    let paginated = services.search.paginates();
    Ok(Json(ProductSearchResponse {
        count: products.len(),
        products,
        page: paginated.then_some(page.page),
        limit: paginated.then_some(page.limit),
    }))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(search_products))
}
