//! HTTP request handlers.

pub mod product_handler;
pub mod test_handler;

pub use product_handler::product_routes;
pub use test_handler::test_routes;
