//! Application services layer - Use cases and business logic.
//!
//! Services are registered in a [`ServiceCollection`] at startup and resolved
//! per request through a [`ServiceScope`].

mod app_setting_service;
pub mod container;
mod diagnostics_service;
mod product_service;

use std::sync::Arc;

use crate::config::AppSettings;
use crate::infra::SqlHelper;

// Service Container
pub use container::{
    Component, Implementation, ServiceCollection, ServiceDescriptor, ServiceLifetime,
    ServiceProvider, ServiceScope,
};

// Service traits and implementations
pub use app_setting_service::{AppSettingService, AppSettingsAccessor};
pub use diagnostics_service::{Diagnostics, DiagnosticsService};
pub use product_service::{ProductCatalog, ProductService};

#[cfg(any(test, feature = "test-utils"))]
pub use app_setting_service::MockAppSettingService;
#[cfg(any(test, feature = "test-utils"))]
pub use diagnostics_service::MockDiagnosticsService;
#[cfg(any(test, feature = "test-utils"))]
pub use product_service::MockProductService;

/// Registration table for every application service.
pub fn register_services(settings: AppSettings, sql: SqlHelper) -> ServiceCollection {
    let mut services = ServiceCollection::new();

    services.add_instance(Arc::new(sql));

    services.add_services::<dyn AppSettingService>(vec![Implementation::of::<
        AppSettingsAccessor,
        _,
    >(move |_| {
        Ok(Arc::new(AppSettingsAccessor::new(settings.clone())) as Arc<dyn AppSettingService>)
    })]);

    services.add_services::<dyn DiagnosticsService>(vec![Implementation::of::<Diagnostics, _>(
        |scope| {
            let settings = scope.resolve::<dyn AppSettingService>()?;
            let sql = scope.resolve::<SqlHelper>()?;
            Ok(Arc::new(Diagnostics::new(settings, sql.as_ref().clone())) as Arc<dyn DiagnosticsService>)
        },
    )]);

    services.add_services::<dyn ProductService>(vec![Implementation::of::<ProductCatalog, _>(
        |_| Ok(Arc::new(ProductCatalog::new()) as Arc<dyn ProductService>),
    )]);

    tracing::debug!(count = services.len(), "Services registered");
    services
}
