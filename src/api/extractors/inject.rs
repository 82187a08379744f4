//! Service extractor - resolves a service from the request scope.

use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::api::AppState;
use crate::errors::AppError;
use crate::services::ServiceScope;

/// Service resolved from the current request's scope.
///
/// # Example
///
/// ```rust,ignore
/// async fn production(Inject(products): Inject<dyn ProductService>) -> Json<Vec<String>> {
///     Json(products.production())
/// }
/// ```
pub struct Inject<S: ?Sized>(pub Arc<S>);

#[async_trait]
impl<S> FromRequestParts<AppState> for Inject<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let service = match parts.extensions.get::<ServiceScope>() {
            Some(scope) => scope.resolve::<S>()?,
            None => {
                // Routes mounted outside the scope middleware get a one-off scope.
                tracing::debug!("No request scope, resolving from a fresh scope");
                state.services.create_scope().resolve::<S>()?
            }
        };
        Ok(Inject(service))
    }
}
