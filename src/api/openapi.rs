//! OpenAPI documentation configuration.
//!
//! Provides Swagger UI for API exploration and testing.

use utoipa::OpenApi;

use crate::api::handlers::{product_handler, test_handler};
use crate::domain::{SummariesResponse, WeatherForecast};

/// OpenAPI documentation for the Web API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "WebApi",
        version = "0.1.0",
        description = "Demo Web API over a stored-procedure SQL helper",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        product_handler::get_production,
        test_handler::get_weathers,
        test_handler::get_server_name,
        test_handler::get_app_name,
        test_handler::get_summaries,
        test_handler::get_summaries_named,
        test_handler::get_summaries_redirect,
    ),
    components(
        schemas(WeatherForecast, SummariesResponse)
    ),
    tags(
        (name = "Product", description = "Product catalog"),
        (name = "Test", description = "Demo and diagnostics endpoints")
    )
)]
pub struct ApiDoc;
