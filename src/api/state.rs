//! Application state - the built service provider.

use crate::config::Config;
use crate::infra::SqlHelper;
use crate::services::{register_services, ServiceProvider};

/// Application state shared by every request.
#[derive(Clone)]
pub struct AppState {
    /// Root of the service container; requests resolve through their own scope.
    pub services: ServiceProvider,
}

impl AppState {
    pub fn new(services: ServiceProvider) -> Self {
        Self { services }
    }

    /// Register every application service against `sql`.
    pub fn from_config(config: &Config, sql: SqlHelper) -> Self {
        Self::new(register_services(config.app.clone(), sql).build())
    }
}
