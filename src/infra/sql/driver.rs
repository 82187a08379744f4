//! Driver seam between the SQL helper and the database client.
//!
//! The helper only ever talks to these traits; [`super::PostgresDriver`] is the
//! production implementation and tests substitute mocks or fakes.

use async_trait::async_trait;

use super::command::SqlCommand;
use super::parameter::SqlParameter;
use super::result::DataSet;
use crate::errors::AppResult;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Opens connections from a connection string.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait SqlDriver: Send + Sync {
    async fn open(&self, connection_string: &str) -> AppResult<Box<dyn SqlConnection>>;
}

/// A live, open connection.
///
/// Executing a command writes output values back into `command.parameters`.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait SqlConnection: Send + Sync {
    /// Name of the database this connection is attached to.
    async fn database(&self) -> AppResult<String>;

    /// Execute and return the number of affected rows.
    async fn execute_non_query(&self, command: &mut SqlCommand) -> AppResult<u64>;

    /// Execute and read every returned row.
    async fn execute_reader(&self, command: &mut SqlCommand) -> AppResult<DataSet>;

    /// Derive a routine's parameters from catalog metadata.
    ///
    /// The first entry is always the return-value parameter.
    async fn derive_parameters(&self, procedure: &str) -> AppResult<Vec<SqlParameter>>;

    /// Release the connection. Further use after closing is an error.
    async fn close(&self) -> AppResult<()>;
}
