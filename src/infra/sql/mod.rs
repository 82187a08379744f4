//! SQL command execution.
//!
//! - [`SqlHelper`]: typed entry points (non-query, dataset, scalar, outputs)
//! - [`ParameterCache`]: discovered stored-procedure signatures
//! - [`SqlDriver`] / [`SqlConnection`]: database seam, PostgreSQL in production

mod cache;
mod command;
mod driver;
mod helper;
mod parameter;
mod postgres;
mod result;

pub use cache::{CacheKey, ParameterCache};
pub use command::{CommandKind, SqlCommand};
pub use driver::{SqlConnection, SqlDriver};
pub use helper::{
    assign_parameter_values, assign_parameter_values_lenient, normalize_table_type_name,
    strip_catalog_qualifier, Assignment, SqlHelper,
};
pub use parameter::{ParameterDirection, SqlParameter, SqlType, SqlValue};
pub use postgres::{PgConnection, PostgresDriver};
pub use result::{DataSet, DataTable, ResultWithOutputParameters};

#[cfg(any(test, feature = "test-utils"))]
pub use driver::{MockSqlConnection, MockSqlDriver};
