//! API middleware.

mod request_scope;

pub use request_scope::request_scope_middleware;
