//! Settings accessor - read-only view of the bound application settings.

use crate::config::AppSettings;

use super::container::Component;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Read access to [`AppSettings`].
#[cfg_attr(any(test, feature = "test-utils"), automock)]
pub trait AppSettingService: Send + Sync {
    /// The whole settings snapshot.
    fn app_settings(&self) -> AppSettings;

    /// Primary database connection string.
    fn connection_string(&self) -> String;

    fn app_name(&self) -> String;
}

/// [`AppSettingService`] over the snapshot bound at startup.
pub struct AppSettingsAccessor {
    settings: AppSettings,
}

impl AppSettingsAccessor {
    pub fn new(settings: AppSettings) -> Self {
        Self { settings }
    }
}

impl Component for AppSettingsAccessor {}

impl AppSettingService for AppSettingsAccessor {
    fn app_settings(&self) -> AppSettings {
        self.settings.clone()
    }

    fn connection_string(&self) -> String {
        self.settings.default_db.clone()
    }

    fn app_name(&self) -> String {
        self.settings.app_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::container::ServiceLifetime;

    #[test]
    fn test_accessor_reads_snapshot() {
        let settings = AppSettings {
            default_db: "postgres://localhost/demo".to_string(),
            app_name: "Demo".to_string(),
        };
        let accessor = AppSettingsAccessor::new(settings.clone());

        assert_eq!(accessor.app_settings(), settings);
        assert_eq!(accessor.connection_string(), "postgres://localhost/demo");
        assert_eq!(accessor.app_name(), "Demo");
        assert_eq!(AppSettingsAccessor::lifetime(), ServiceLifetime::Scoped);
    }
}
