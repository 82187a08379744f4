//! Infrastructure layer - External systems integration
//!
//! This module handles all external system concerns:
//! - SQL command execution and the stored-procedure parameter cache
//! - Database drivers

pub mod sql;

pub use sql::{
    CommandKind, DataSet, DataTable, ParameterCache, ParameterDirection, PostgresDriver,
    ResultWithOutputParameters, SqlCommand, SqlConnection, SqlDriver, SqlHelper, SqlParameter,
    SqlType, SqlValue,
};

#[cfg(any(test, feature = "test-utils"))]
pub use sql::{MockSqlConnection, MockSqlDriver};
