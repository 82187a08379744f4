//! Per-request service scope.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::AppState;

/// Open a fresh [`crate::services::ServiceScope`] for the request and store it
/// in the request extensions. Scoped services live until the response is built.
pub async fn request_scope_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let scope = state.services.create_scope();
    request.extensions_mut().insert(scope);
    next.run(request).await
}
