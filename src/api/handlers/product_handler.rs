//! Product handlers.

use axum::{response::Json, routing::get, Router};

use crate::api::extractors::Inject;
use crate::api::AppState;
use crate::services::ProductService;

/// Create product routes
pub fn product_routes() -> Router<AppState> {
    Router::new().route("/GetProduction", get(get_production))
}

/// List products in production
#[utoipa::path(
    get,
    path = "/api/Product/GetProduction",
    tag = "Product",
    responses(
        (status = 200, description = "Product names", body = Vec<String>)
    )
)]
pub async fn get_production(Inject(products): Inject<dyn ProductService>) -> Json<Vec<String>> {
    Json(products.production())
}
