//! Diagnostics service - database server name and application name.

use async_trait::async_trait;
use std::sync::Arc;

use super::app_setting_service::AppSettingService;
use super::container::Component;
use crate::config::{PING_QUERY, SERVER_NAME_QUERY};
use crate::errors::{AppError, AppResult};
use crate::infra::{CommandKind, SqlHelper};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait DiagnosticsService: Send + Sync {
    /// Name of the database server behind the primary connection string.
    async fn server_name(&self) -> AppResult<String>;

    /// Round-trip a trivial query against the primary database.
    async fn ping(&self) -> AppResult<()>;

    fn app_name(&self) -> String;
}

/// [`DiagnosticsService`] backed by the SQL helper.
pub struct Diagnostics {
    settings: Arc<dyn AppSettingService>,
    sql: SqlHelper,
}

impl Diagnostics {
    pub fn new(settings: Arc<dyn AppSettingService>, sql: SqlHelper) -> Self {
        Self { settings, sql }
    }
}

impl Component for Diagnostics {}

#[async_trait]
impl DiagnosticsService for Diagnostics {
    async fn server_name(&self) -> AppResult<String> {
        let name: Option<String> = self
            .sql
            .execute_scalar_as(
                &self.settings.connection_string(),
                CommandKind::Text,
                SERVER_NAME_QUERY,
                Vec::new(),
            )
            .await?;

        name.filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::internal("database returned no server name"))
    }

    async fn ping(&self) -> AppResult<()> {
        self.sql
            .execute_scalar(
                &self.settings.connection_string(),
                CommandKind::Text,
                PING_QUERY,
                Vec::new(),
            )
            .await?;
        Ok(())
    }

    fn app_name(&self) -> String {
        self.settings.app_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::sql::{DataSet, DataTable, MockSqlConnection, MockSqlDriver, SqlConnection};
    use crate::services::MockAppSettingService;
    use serde_json::json;

    fn settings() -> Arc<dyn AppSettingService> {
        let mut settings = MockAppSettingService::new();
        settings
            .expect_connection_string()
            .returning(|| "postgres://localhost/demo".to_string());
        settings.expect_app_name().returning(|| "Demo".to_string());
        Arc::new(settings)
    }

    fn driver_returning(cell: serde_json::Value) -> MockSqlDriver {
        let mut driver = MockSqlDriver::new();
        driver.expect_open().times(1).returning(move |target| {
            assert_eq!(target, "postgres://localhost/demo");
            let cell = cell.clone();
            let mut connection = MockSqlConnection::new();
            connection.expect_execute_reader().times(1).returning(move |command| {
                assert_eq!(command.text, SERVER_NAME_QUERY);
                Ok(DataSet::single(DataTable::from_records(vec![json!({ "name": cell.clone() })])))
            });
            connection.expect_close().times(1).returning(|| Ok(()));
            Ok(Box::new(connection) as Box<dyn SqlConnection>)
        });
        driver
    }

    #[tokio::test]
    async fn test_server_name_reads_first_cell() {
        let sql = SqlHelper::new(Arc::new(driver_returning(json!("pg-primary"))));
        let diagnostics = Diagnostics::new(settings(), sql);

        assert_eq!(diagnostics.server_name().await.unwrap(), "pg-primary");
        assert_eq!(diagnostics.app_name(), "Demo");
    }

    #[tokio::test]
    async fn test_null_server_name_is_an_error() {
        let sql = SqlHelper::new(Arc::new(driver_returning(json!(null))));
        let diagnostics = Diagnostics::new(settings(), sql);

        assert!(matches!(diagnostics.server_name().await, Err(AppError::Internal(_))));
    }
}
