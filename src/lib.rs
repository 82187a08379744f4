//! WebApi data - a demo Web API over a stored-procedure SQL helper.
//!
//! # Architecture Layers
//!
//! - **cli**: Command-line interface
//! - **commands**: CLI command implementations
//! - **config**: Application configuration and constants
//! - **domain**: Payloads of the demo endpoints
//! - **services**: Service container and application services
//! - **infra**: SQL command execution and the parameter cache
//! - **api**: HTTP handlers, middleware, and routes
//! - **errors**: Centralized error handling
//!
//! # CLI Usage
//!
//! ```bash
//! # Start the server
//! cargo run -- serve
//!
//! # Show a stored procedure's parameters
//! cargo run -- describe public.get_orders --return-value
//!
//! # Print the database server name
//! cargo run -- server-name
//! ```

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod infra;
pub mod services;

// Re-export commonly used types at crate root
pub use api::AppState;
pub use config::{AppSettings, Config};
pub use errors::{AppError, AppResult};
pub use infra::SqlHelper;
