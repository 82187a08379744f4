//! Demo and diagnostics handlers.

use axum::{
    extract::Path,
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};

use crate::api::extractors::Inject;
use crate::api::AppState;
use crate::config::SUMMARIES_REDIRECT_TARGET;
use crate::domain::{SummariesResponse, WeatherForecast};
use crate::errors::AppResult;
use crate::services::DiagnosticsService;

/// Create test routes
pub fn test_routes() -> Router<AppState> {
    Router::new()
        .route("/GetWeathers", get(get_weathers))
        .route("/GetServerName", get(get_server_name))
        .route("/GetAppName", get(get_app_name))
        .route("/GetSummaries/:id", get(get_summaries))
        .route("/GetSummaries/:id/:name", get(get_summaries_named))
        .route("/GetSummariesRedirect", get(get_summaries_redirect))
}

/// Random forecasts for the next five days
#[utoipa::path(
    get,
    path = "/api/Test/GetWeathers",
    tag = "Test",
    responses(
        (status = 200, description = "Forecasts", body = Vec<WeatherForecast>)
    )
)]
pub async fn get_weathers() -> Json<Vec<WeatherForecast>> {
    Json(WeatherForecast::forecast())
}

/// Database server name; fails when the database is unreachable
#[utoipa::path(
    get,
    path = "/api/Test/GetServerName",
    tag = "Test",
    responses(
        (status = 200, description = "Server name", body = String, content_type = "text/plain"),
        (status = 500, description = "Database error")
    )
)]
pub async fn get_server_name(
    Inject(diagnostics): Inject<dyn DiagnosticsService>,
) -> AppResult<String> {
    diagnostics.server_name().await
}

/// Configured application name
#[utoipa::path(
    get,
    path = "/api/Test/GetAppName",
    tag = "Test",
    responses(
        (status = 200, description = "Application name", body = String, content_type = "text/plain")
    )
)]
pub async fn get_app_name(Inject(diagnostics): Inject<dyn DiagnosticsService>) -> String {
    diagnostics.app_name()
}

/// Weather summaries echoed with the caller's id
#[utoipa::path(
    get,
    path = "/api/Test/GetSummaries/{id}",
    tag = "Test",
    params(("id" = i32, Path, description = "Caller id")),
    responses(
        (status = 200, description = "Summaries", body = SummariesResponse)
    )
)]
pub async fn get_summaries(Path(id): Path<i32>) -> Json<SummariesResponse> {
    Json(SummariesResponse::new(id, None))
}

/// Weather summaries echoed with the caller's id and name
#[utoipa::path(
    get,
    path = "/api/Test/GetSummaries/{id}/{name}",
    tag = "Test",
    params(
        ("id" = i32, Path, description = "Caller id"),
        ("name" = String, Path, description = "Caller name")
    ),
    responses(
        (status = 200, description = "Summaries", body = SummariesResponse)
    )
)]
pub async fn get_summaries_named(Path((id, name)): Path<(i32, String)>) -> Json<SummariesResponse> {
    Json(SummariesResponse::new(id, Some(name)))
}

/// Redirect to the summaries of caller 1, "John"
#[utoipa::path(
    get,
    path = "/api/Test/GetSummariesRedirect",
    tag = "Test",
    responses(
        (status = 302, description = "Redirect to GetSummaries")
    )
)]
pub async fn get_summaries_redirect() -> impl IntoResponse {
    (StatusCode::FOUND, [(LOCATION, SUMMARIES_REDIRECT_TARGET)])
}
