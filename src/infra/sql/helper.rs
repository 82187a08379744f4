//! SQL helper - typed entry points for running commands.
//!
//! Connection-string entry points open a connection per call and always close
//! it before returning. The `_on` variants borrow a caller-owned connection and
//! leave it open.
//!
//! Stored-procedure entry points that take positional values resolve the
//! procedure's signature through the [`ParameterCache`], assign the values in
//! declared order and delegate to the typed path.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use super::cache::ParameterCache;
use super::command::{CommandKind, SqlCommand};
use super::driver::{SqlConnection, SqlDriver};
use super::parameter::{SqlParameter, SqlValue};
use super::postgres::PostgresDriver;
use super::result::{DataSet, ResultWithOutputParameters};
use crate::config::{PARAMETER_COUNT_MISMATCH, PARAMETER_COUNT_MISMATCH_SP};
use crate::errors::{AppError, AppResult};

/// How positional values are matched against a discovered signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Counts must match exactly.
    Strict,
    /// Exact match first; with fewer values than parameters only the leading
    /// parameters are filled and the rest keep their discovered default.
    Lenient,
}

/// Assign `values` to `parameters` in order; counts must match.
pub fn assign_parameter_values(parameters: &mut [SqlParameter], values: &[SqlValue]) -> AppResult<()> {
    if parameters.len() != values.len() {
        return Err(AppError::mismatch(PARAMETER_COUNT_MISMATCH));
    }
    for (parameter, value) in parameters.iter_mut().zip(values) {
        parameter.value = Some(value.clone());
    }
    Ok(())
}

/// Strict assignment, falling back to filling a prefix when fewer values than
/// parameters were supplied.
pub fn assign_parameter_values_lenient(
    parameters: &mut [SqlParameter],
    values: &[SqlValue],
) -> AppResult<()> {
    if assign_parameter_values(parameters, values).is_ok() {
        return Ok(());
    }
    if values.len() >= parameters.len() {
        return Err(AppError::mismatch(PARAMETER_COUNT_MISMATCH_SP));
    }

    tracing::debug!(
        supplied = values.len(),
        declared = parameters.len(),
        "Assigning leading parameters only"
    );
    for (parameter, value) in parameters.iter_mut().zip(values) {
        parameter.value = Some(value.clone());
    }
    Ok(())
}

fn assign(parameters: &mut [SqlParameter], values: &[SqlValue], mode: Assignment) -> AppResult<()> {
    match mode {
        Assignment::Strict => assign_parameter_values(parameters, values),
        Assignment::Lenient => assign_parameter_values_lenient(parameters, values),
    }
}

/// Strip a leading `"<database>."` qualifier from a table-type name.
///
/// `mydb.dbo.MyType` becomes `dbo.MyType` when the database is `mydb`; names
/// without that prefix come back unchanged.
pub fn normalize_table_type_name(type_name: &str, database: &str) -> AppResult<String> {
    if type_name.is_empty() || type_name.split('.').any(str::is_empty) {
        return Err(AppError::MalformedTypeName(type_name.to_string()));
    }

    let prefix = format!("{}.", database);
    Ok(type_name
        .strip_prefix(prefix.as_str())
        .unwrap_or(type_name)
        .to_string())
}

/// Drop the first qualifier of a type name when at least two parts remain.
///
/// `mydb.dbo.MyType` becomes `dbo.MyType`; `dbo.MyType` and `MyType` are kept.
pub fn strip_catalog_qualifier(type_name: &str) -> &str {
    match type_name.split_once('.') {
        Some((_, rest)) if rest.contains('.') => rest,
        _ => type_name,
    }
}

/// Convert a cell or output value into `T`; SQL NULL becomes `None`.
fn convert_json<T: DeserializeOwned>(value: Option<JsonValue>) -> AppResult<Option<T>> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| AppError::conversion(e.to_string())),
    }
}

fn convert_output<T: DeserializeOwned>(parameter: &SqlParameter) -> AppResult<T> {
    let value = parameter
        .value
        .as_ref()
        .map(SqlValue::to_json)
        .unwrap_or(JsonValue::Null);
    serde_json::from_value(value).map_err(|e| {
        AppError::conversion(format!("output parameter {}: {}", parameter.name, e))
    })
}

fn cell_to_i64(cell: &JsonValue) -> AppResult<i64> {
    match cell {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .ok_or_else(|| AppError::conversion(format!("{} is not an integer", n))),
        JsonValue::String(s) => s
            .trim()
            .parse()
            .map_err(|_| AppError::conversion(format!("{} is not an integer", s))),
        JsonValue::Bool(b) => Ok(i64::from(*b)),
        other => Err(AppError::conversion(format!("{} is not an integer", other))),
    }
}

/// Close an internally opened connection, keeping the command's own result.
async fn release<T>(connection: Box<dyn SqlConnection>, result: AppResult<T>) -> AppResult<T> {
    if let Err(e) = connection.close().await {
        tracing::warn!("Failed to close connection: {}", e);
    }
    result
}

/// Command executor over a [`SqlDriver`].
#[derive(Clone)]
pub struct SqlHelper {
    driver: Arc<dyn SqlDriver>,
    cache: Arc<ParameterCache>,
}

impl SqlHelper {
    /// Helper with its own parameter cache.
    pub fn new(driver: Arc<dyn SqlDriver>) -> Self {
        let cache = Arc::new(ParameterCache::new(driver.clone()));
        Self { driver, cache }
    }

    /// Helper sharing an existing parameter cache.
    pub fn with_cache(driver: Arc<dyn SqlDriver>, cache: Arc<ParameterCache>) -> Self {
        Self { driver, cache }
    }

    /// Helper backed by PostgreSQL.
    pub fn postgres() -> Self {
        Self::new(Arc::new(PostgresDriver::new()))
    }

    pub fn parameter_cache(&self) -> &Arc<ParameterCache> {
        &self.cache
    }

    /// Open a connection the caller owns (and must close).
    pub async fn open(&self, target: &str) -> AppResult<Box<dyn SqlConnection>> {
        self.driver.open(target).await
    }

    /// True when the first table of `data` has at least one row.
    pub fn is_dataset_valid(data: &DataSet) -> bool {
        data.has_rows()
    }

    /// Resolve `procedure` and assign `values` to its parameters.
    async fn bind_values(
        &self,
        target: &str,
        procedure: &str,
        values: &[SqlValue],
        mode: Assignment,
    ) -> AppResult<Vec<SqlParameter>> {
        let mut parameters = self.cache.resolve_default(target, procedure).await?;
        assign(&mut parameters, values, mode)?;
        Ok(parameters)
    }

    async fn run_non_query(&self, target: &str, command: &mut SqlCommand) -> AppResult<u64> {
        let connection = self.driver.open(target).await?;
        let result = connection.execute_non_query(command).await;
        release(connection, result).await
    }

    // =========================================================================
    // Non-query
    // =========================================================================

    pub async fn execute_non_query(
        &self,
        target: &str,
        kind: CommandKind,
        text: &str,
        parameters: Vec<SqlParameter>,
    ) -> AppResult<u64> {
        let connection = self.driver.open(target).await?;
        let result = self
            .execute_non_query_on(connection.as_ref(), kind, text, parameters)
            .await;
        release(connection, result).await
    }

    pub async fn execute_non_query_on(
        &self,
        connection: &dyn SqlConnection,
        kind: CommandKind,
        text: &str,
        parameters: Vec<SqlParameter>,
    ) -> AppResult<u64> {
        let mut command = SqlCommand::new(kind, text, parameters);
        tracing::debug!(?kind, text, "Executing non-query");
        connection.execute_non_query(&mut command).await
    }

    /// Run a stored procedure with positional values (strict count match).
    pub async fn execute_non_query_sp(
        &self,
        target: &str,
        procedure: &str,
        values: &[SqlValue],
    ) -> AppResult<u64> {
        let parameters = if values.is_empty() {
            Vec::new()
        } else {
            self.bind_values(target, procedure, values, Assignment::Strict)
                .await?
        };
        self.execute_non_query(target, CommandKind::StoredProcedure, procedure, parameters)
            .await
    }

    /// Run a command after dropping the first qualifier from structured type names.
    pub async fn execute_non_query_with_format_name(
        &self,
        target: &str,
        kind: CommandKind,
        text: &str,
        mut parameters: Vec<SqlParameter>,
    ) -> AppResult<u64> {
        for parameter in parameters.iter_mut().filter(|p| p.is_structured()) {
            let stripped = strip_catalog_qualifier(&parameter.type_name).to_string();
            parameter.type_name = stripped;
        }
        self.execute_non_query(target, kind, text, parameters).await
    }

    /// Positional-value variant of [`Self::execute_non_query_with_format_name`].
    pub async fn execute_non_query_with_table_type(
        &self,
        target: &str,
        procedure: &str,
        values: &[SqlValue],
    ) -> AppResult<u64> {
        if values.is_empty() {
            return self
                .execute_non_query(target, CommandKind::StoredProcedure, procedure, Vec::new())
                .await;
        }
        let parameters = self
            .bind_values(target, procedure, values, Assignment::Strict)
            .await?;
        self.execute_non_query_with_format_name(
            target,
            CommandKind::StoredProcedure,
            procedure,
            parameters,
        )
        .await
    }

    // =========================================================================
    // Datasets
    // =========================================================================

    pub async fn execute_dataset(
        &self,
        target: &str,
        kind: CommandKind,
        text: &str,
        parameters: Vec<SqlParameter>,
    ) -> AppResult<DataSet> {
        let connection = self.driver.open(target).await?;
        let result = self
            .execute_dataset_on(connection.as_ref(), kind, text, parameters)
            .await;
        release(connection, result).await
    }

    pub async fn execute_dataset_on(
        &self,
        connection: &dyn SqlConnection,
        kind: CommandKind,
        text: &str,
        parameters: Vec<SqlParameter>,
    ) -> AppResult<DataSet> {
        let mut command = SqlCommand::new(kind, text, parameters);
        tracing::debug!(?kind, text, "Executing dataset");
        connection.execute_reader(&mut command).await
    }

    /// Run a stored procedure with positional values (lenient count match).
    pub async fn execute_dataset_sp(
        &self,
        target: &str,
        procedure: &str,
        values: &[SqlValue],
    ) -> AppResult<DataSet> {
        let parameters = if values.is_empty() {
            Vec::new()
        } else {
            self.bind_values(target, procedure, values, Assignment::Lenient)
                .await?
        };
        self.execute_dataset(target, CommandKind::StoredProcedure, procedure, parameters)
            .await
    }

    /// Like [`Self::execute_dataset_sp`], with table-type names stripped of the
    /// target database qualifier first.
    pub async fn execute_dataset_with_table_type(
        &self,
        target: &str,
        procedure: &str,
        values: &[SqlValue],
    ) -> AppResult<DataSet> {
        if values.is_empty() {
            return self
                .execute_dataset(target, CommandKind::StoredProcedure, procedure, Vec::new())
                .await;
        }

        let mut parameters = self.cache.resolve_default(target, procedure).await?;
        self.fix_table_value_type_names(&mut parameters, target)
            .await?;
        assign(&mut parameters, values, Assignment::Lenient)?;

        self.execute_dataset(target, CommandKind::StoredProcedure, procedure, parameters)
            .await
    }

    /// Strip the target database name from structured parameter type names.
    ///
    /// The connection opened to learn the database name is closed before any
    /// error is returned.
    pub async fn fix_table_value_type_names(
        &self,
        parameters: &mut [SqlParameter],
        target: &str,
    ) -> AppResult<()> {
        if target.is_empty() {
            return Err(AppError::validation("connection string must not be empty"));
        }
        if parameters.is_empty() {
            return Ok(());
        }

        let connection = self.driver.open(target).await?;
        let result = async {
            let database = connection.database().await?;
            for parameter in parameters.iter_mut().filter(|p| p.is_structured()) {
                parameter.type_name = normalize_table_type_name(&parameter.type_name, &database)?;
            }
            Ok::<(), AppError>(())
        }
        .await;
        release(connection, result).await
    }

    /// First cell of the first row returned by `procedure(id)` as an integer, or 0.
    pub async fn execute_single_dataset(
        &self,
        target: &str,
        procedure: &str,
        id: i64,
    ) -> AppResult<i64> {
        let data = self
            .execute_dataset_sp(target, procedure, &[SqlValue::Int(id)])
            .await?;
        data.first_cell().map(cell_to_i64).unwrap_or(Ok(0))
    }

    /// First cell of the first row returned by `procedure` as an integer, or 0.
    pub async fn execute_single_table(
        &self,
        target: &str,
        procedure: &str,
        parameters: Vec<SqlParameter>,
    ) -> AppResult<i64> {
        let data = self
            .execute_dataset(target, CommandKind::StoredProcedure, procedure, parameters)
            .await?;
        data.first_cell().map(cell_to_i64).unwrap_or(Ok(0))
    }

    // =========================================================================
    // Scalars
    // =========================================================================

    /// First cell of the first row. `None` when no row came back; SQL NULL is
    /// `Some(JsonValue::Null)`.
    pub async fn execute_scalar(
        &self,
        target: &str,
        kind: CommandKind,
        text: &str,
        parameters: Vec<SqlParameter>,
    ) -> AppResult<Option<JsonValue>> {
        let connection = self.driver.open(target).await?;
        let result = self
            .execute_scalar_on(connection.as_ref(), kind, text, parameters)
            .await;
        release(connection, result).await
    }

    pub async fn execute_scalar_on(
        &self,
        connection: &dyn SqlConnection,
        kind: CommandKind,
        text: &str,
        parameters: Vec<SqlParameter>,
    ) -> AppResult<Option<JsonValue>> {
        let data = self
            .execute_dataset_on(connection, kind, text, parameters)
            .await?;
        Ok(data.first_cell().cloned())
    }

    /// Scalar converted to `T`; no row and SQL NULL both give `None`.
    pub async fn execute_scalar_as<T: DeserializeOwned>(
        &self,
        target: &str,
        kind: CommandKind,
        text: &str,
        parameters: Vec<SqlParameter>,
    ) -> AppResult<Option<T>> {
        let value = self.execute_scalar(target, kind, text, parameters).await?;
        convert_json(value)
    }

    pub async fn execute_scalar_as_on<T: DeserializeOwned>(
        &self,
        connection: &dyn SqlConnection,
        kind: CommandKind,
        text: &str,
        parameters: Vec<SqlParameter>,
    ) -> AppResult<Option<T>> {
        let value = self
            .execute_scalar_on(connection, kind, text, parameters)
            .await?;
        convert_json(value)
    }

    /// Run a stored procedure with positional values (lenient count match).
    pub async fn execute_scalar_sp(
        &self,
        target: &str,
        procedure: &str,
        values: &[SqlValue],
    ) -> AppResult<Option<JsonValue>> {
        let parameters = if values.is_empty() {
            Vec::new()
        } else {
            self.bind_values(target, procedure, values, Assignment::Lenient)
                .await?
        };
        self.execute_scalar(target, CommandKind::StoredProcedure, procedure, parameters)
            .await
    }

    /// Typed scalar from a stored procedure with positional values (strict).
    pub async fn execute_scalar_sp_as<T: DeserializeOwned>(
        &self,
        target: &str,
        procedure: &str,
        values: &[SqlValue],
    ) -> AppResult<Option<T>> {
        let parameters = if values.is_empty() {
            Vec::new()
        } else {
            self.bind_values(target, procedure, values, Assignment::Strict)
                .await?
        };
        self.execute_scalar_as(target, CommandKind::StoredProcedure, procedure, parameters)
            .await
    }

    // =========================================================================
    // Output parameters
    // =========================================================================

    pub async fn execute_dataset_with_output_parameters(
        &self,
        target: &str,
        kind: CommandKind,
        text: &str,
        parameters: Vec<SqlParameter>,
    ) -> AppResult<ResultWithOutputParameters<DataSet>> {
        let connection = self.driver.open(target).await?;
        let result = self
            .execute_dataset_with_output_parameters_on(connection.as_ref(), kind, text, parameters)
            .await;
        release(connection, result).await
    }

    pub async fn execute_dataset_with_output_parameters_on(
        &self,
        connection: &dyn SqlConnection,
        kind: CommandKind,
        text: &str,
        parameters: Vec<SqlParameter>,
    ) -> AppResult<ResultWithOutputParameters<DataSet>> {
        let mut command = SqlCommand::new(kind, text, parameters);
        tracing::debug!(?kind, text, "Executing dataset with output parameters");
        let data = connection.execute_reader(&mut command).await?;
        Ok(ResultWithOutputParameters::new(
            data,
            command.output_parameters(),
        ))
    }

    /// Positional-value variant; the signature is always resolved.
    pub async fn execute_dataset_with_output_parameters_sp(
        &self,
        target: &str,
        procedure: &str,
        values: &[SqlValue],
    ) -> AppResult<ResultWithOutputParameters<DataSet>> {
        let mut parameters = self.cache.resolve_default(target, procedure).await?;
        if !values.is_empty() {
            assign_parameter_values(&mut parameters, values)?;
        }
        self.execute_dataset_with_output_parameters(
            target,
            CommandKind::StoredProcedure,
            procedure,
            parameters,
        )
        .await
    }

    /// Run a stored procedure and return its first output parameter as `T`.
    pub async fn execute_non_query_with_output_parameter<T: DeserializeOwned>(
        &self,
        target: &str,
        procedure: &str,
        values: &[SqlValue],
    ) -> AppResult<T> {
        let outputs = self.non_query_outputs(target, procedure, values, 1).await?;
        convert_output(&outputs[0])
    }

    /// Run a stored procedure and return its first two output parameters.
    pub async fn execute_non_query_with_output_parameters<T1, T2>(
        &self,
        target: &str,
        procedure: &str,
        values: &[SqlValue],
    ) -> AppResult<(T1, T2)>
    where
        T1: DeserializeOwned,
        T2: DeserializeOwned,
    {
        let outputs = self.non_query_outputs(target, procedure, values, 2).await?;
        Ok((convert_output(&outputs[0])?, convert_output(&outputs[1])?))
    }

    async fn non_query_outputs(
        &self,
        target: &str,
        procedure: &str,
        values: &[SqlValue],
        expected: usize,
    ) -> AppResult<Vec<SqlParameter>> {
        let mut parameters = self.cache.resolve_default(target, procedure).await?;
        assign_parameter_values(&mut parameters, values)?;

        let mut command = SqlCommand::new(CommandKind::StoredProcedure, procedure, parameters);
        self.run_non_query(target, &mut command).await?;

        let outputs = command.output_parameters();
        if outputs.len() < expected {
            return Err(AppError::validation(format!(
                "{} declares {} output parameter(s), {} required",
                procedure,
                outputs.len(),
                expected
            )));
        }
        Ok(outputs)
    }
}
