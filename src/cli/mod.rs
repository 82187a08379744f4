//! CLI module - Command-line interface for the application.
//!
//! Provides commands for:
//! - `serve` - Start the HTTP server
//! - `describe` - Print a stored procedure's parameter signature
//! - `server-name` - Print the database server name

pub mod args;

pub use args::{Cli, Commands};
