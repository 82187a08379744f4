//! PostgreSQL implementation of the driver seam, on top of sea-orm.
//!
//! Every command runs inside its own short transaction so the statement timeout
//! can be set with `SET LOCAL` on the exact connection that runs the command.

use async_trait::async_trait;
use sea_orm::{
    prelude::{ChronoDate, ChronoDateTime, ChronoDateTimeWithTimeZone, ChronoTime, Decimal, Uuid},
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbBackend,
    QueryResult, Statement, TransactionTrait, Value,
};
use serde_json::Value as JsonValue;

use super::command::{CommandKind, SqlCommand};
use super::driver::{SqlConnection, SqlDriver};
use super::parameter::{ParameterDirection, SqlParameter, SqlType, SqlValue};
use super::result::{DataSet, DataTable};
use crate::config::RETURN_VALUE_PARAMETER;
use crate::errors::{AppError, AppResult};

const ROUTINE_KIND_QUERY: &str = r#"
SELECT p.prokind::text AS kind
FROM pg_catalog.pg_proc p
JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
WHERE p.proname::text = $1
  AND (($2::text IS NULL AND n.nspname = ANY (current_schemas(true))) OR n.nspname::text = $2::text)
ORDER BY array_position(current_schemas(true), n.nspname)
LIMIT 1"#;

const DERIVE_PARAMETERS_QUERY: &str = r#"
WITH routine AS (
    SELECT p.oid
    FROM pg_catalog.pg_proc p
    JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
    WHERE p.proname::text = $1
      AND (($2::text IS NULL AND n.nspname = ANY (current_schemas(true))) OR n.nspname::text = $2::text)
    ORDER BY array_position(current_schemas(true), n.nspname)
    LIMIT 1
)
SELECT p.prokind::text AS kind,
       format_type(p.prorettype, NULL) AS return_type,
       a.name::text AS name,
       a.mode::text AS mode,
       format_type(a.type_oid, NULL) AS type_name,
       t.typtype::text AS type_kind,
       et.typtype::text AS element_kind
FROM routine r
JOIN pg_catalog.pg_proc p ON p.oid = r.oid
LEFT JOIN LATERAL unnest(
        COALESCE(p.proallargtypes, p.proargtypes::oid[]),
        COALESCE(p.proargmodes, array_fill('i'::"char", ARRAY[cardinality(p.proargtypes::oid[])])),
        COALESCE(p.proargnames, array_fill(''::text, ARRAY[cardinality(p.proargtypes::oid[])]))
    ) WITH ORDINALITY AS a(type_oid, mode, name, ordinality) ON true
LEFT JOIN pg_catalog.pg_type t ON t.oid = a.type_oid
LEFT JOIN pg_catalog.pg_type et ON et.oid = t.typelem AND t.typelem <> 0
ORDER BY a.ordinality"#;

/// Opens one single-connection pool per `open` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SqlDriver for PostgresDriver {
    async fn open(&self, connection_string: &str) -> AppResult<Box<dyn SqlConnection>> {
        let mut options = ConnectOptions::new(connection_string.to_owned());
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let connection = Database::connect(options).await?;
        Ok(Box::new(PgConnection::new(connection)))
    }
}

/// A sea-orm connection exposed through [`SqlConnection`].
#[derive(Clone)]
pub struct PgConnection {
    connection: DatabaseConnection,
}

impl PgConnection {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Begin a transaction with the command's timeout applied.
    async fn begin(&self, command: &SqlCommand) -> AppResult<DatabaseTransaction> {
        let txn = self.connection.begin().await?;
        let millis = command.timeout.map(|t| t.as_millis()).unwrap_or(0);
        txn.execute_unprepared(&format!("SET LOCAL statement_timeout = {}", millis))
            .await?;
        Ok(txn)
    }

    async fn finish<T>(txn: DatabaseTransaction, result: AppResult<T>) -> AppResult<T> {
        match result {
            Ok(value) => {
                txn.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::error!("Command rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl SqlConnection for PgConnection {
    async fn database(&self) -> AppResult<String> {
        let row = self
            .connection
            .query_one(Statement::from_string(
                DbBackend::Postgres,
                "SELECT current_database()::text AS name",
            ))
            .await?
            .ok_or_else(|| AppError::internal("current_database() returned no row"))?;
        Ok(row.try_get::<String>("", "name")?)
    }

    async fn execute_non_query(&self, command: &mut SqlCommand) -> AppResult<u64> {
        let txn = self.begin(command).await?;
        let result = match command.kind {
            CommandKind::Text => {
                let statement = text_statement(command);
                txn.execute(statement)
                    .await
                    .map(|r| r.rows_affected())
                    .map_err(AppError::from)
            }
            CommandKind::StoredProcedure => {
                call_routine(&txn, command).await.map(|(kind, table)| match kind {
                    RoutineKind::Procedure => 0,
                    RoutineKind::Function => table.rows.len() as u64,
                })
            }
        };
        Self::finish(txn, result).await
    }

    async fn execute_reader(&self, command: &mut SqlCommand) -> AppResult<DataSet> {
        let txn = self.begin(command).await?;
        let result = match command.kind {
            CommandKind::Text => {
                let statement = text_statement(command);
                match txn.query_all(statement).await {
                    Ok(rows) => table_from_rows(&rows).map(DataSet::single),
                    Err(e) => Err(AppError::from(e)),
                }
            }
            CommandKind::StoredProcedure => call_routine(&txn, command)
                .await
                .map(|(_, table)| DataSet::single(table)),
        };
        Self::finish(txn, result).await
    }

    async fn derive_parameters(&self, procedure: &str) -> AppResult<Vec<SqlParameter>> {
        let routine = RoutineName::parse(procedure)?;
        let rows = self
            .connection
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                DERIVE_PARAMETERS_QUERY,
                routine.lookup_values(),
            ))
            .await?;

        let first = rows
            .first()
            .ok_or_else(|| AppError::ProcedureNotFound(procedure.to_string()))?;
        let kind = RoutineKind::from_prokind(first.try_get::<Option<String>>("", "kind")?);

        let return_type = match kind {
            RoutineKind::Procedure => "integer".to_string(),
            RoutineKind::Function => first
                .try_get::<Option<String>>("", "return_type")?
                .unwrap_or_else(|| "void".to_string()),
        };
        let mut parameters = vec![SqlParameter::typed(
            RETURN_VALUE_PARAMETER,
            ParameterDirection::ReturnValue,
            SqlType::from_pg(&return_type),
            return_type,
        )];

        for row in &rows {
            if let Some(parameter) = parameter_from_row(row)? {
                parameters.push(parameter);
            }
        }

        Ok(parameters)
    }

    async fn close(&self) -> AppResult<()> {
        self.connection.clone().close().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoutineKind {
    Procedure,
    Function,
}

impl RoutineKind {
    fn from_prokind(kind: Option<String>) -> Self {
        match kind.as_deref() {
            Some("p") => RoutineKind::Procedure,
            _ => RoutineKind::Function,
        }
    }
}

/// A routine name split into its (case-folded) parts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RoutineName {
    schema: Option<String>,
    name: String,
}

impl RoutineName {
    /// Parse `name`, `schema.name`, or quoted variants. Unquoted parts fold to
    /// lower case the way the server folds them.
    fn parse(text: &str) -> AppResult<Self> {
        let parts = split_identifier(text.trim())
            .ok_or_else(|| AppError::validation(format!("Invalid routine name: {}", text)))?;

        match parts.as_slice() {
            [name] => Ok(Self {
                schema: None,
                name: name.clone(),
            }),
            [schema, name] => Ok(Self {
                schema: Some(schema.clone()),
                name: name.clone(),
            }),
            _ => Err(AppError::validation(format!(
                "Invalid routine name: {}",
                text
            ))),
        }
    }

    fn lookup_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.name.clone()),
            match &self.schema {
                Some(schema) => Value::from(schema.clone()),
                None => Value::String(None),
            },
        ]
    }

    /// Quoted form safe to splice into SQL.
    fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

fn split_identifier(text: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut was_quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => {
                quoted = !quoted;
                was_quoted = true;
            }
            '.' if !quoted => {
                parts.push(finish_part(&mut current, &mut was_quoted)?);
            }
            c if quoted || c.is_alphanumeric() || c == '_' || c == '$' => current.push(c),
            _ => return None,
        }
    }

    if quoted {
        return None;
    }
    parts.push(finish_part(&mut current, &mut was_quoted)?);
    Some(parts)
}

fn finish_part(current: &mut String, was_quoted: &mut bool) -> Option<String> {
    if current.is_empty() {
        return None;
    }
    let part = if *was_quoted {
        std::mem::take(current)
    } else {
        std::mem::take(current).to_lowercase()
    };
    *was_quoted = false;
    Some(part)
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Type names are spliced into casts, so only type-name characters pass.
fn checked_type_name(type_name: &str) -> AppResult<&str> {
    let valid = type_name.chars().all(|c| {
        c.is_alphanumeric() || matches!(c, '_' | '.' | ' ' | '[' | ']' | '(' | ')' | ',' | '"')
    });
    if valid {
        Ok(type_name)
    } else {
        Err(AppError::MalformedTypeName(type_name.to_string()))
    }
}

fn to_db_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::String(None),
        SqlValue::Bool(b) => Value::from(*b),
        SqlValue::Int(i) => Value::from(*i),
        SqlValue::Float(f) => Value::from(*f),
        SqlValue::Text(s) => Value::from(s.clone()),
        SqlValue::Json(j) => Value::from(j.clone()),
    }
}

/// Placeholder expression for a bound parameter, with a cast to its declared type.
fn placeholder(parameter: &SqlParameter, index: usize) -> AppResult<String> {
    if parameter.type_name.is_empty() {
        return Ok(format!("${}", index));
    }
    let type_name = checked_type_name(&parameter.type_name)?;

    if parameter.is_structured() {
        return Ok(match type_name.strip_suffix("[]") {
            Some(element) => format!(
                "(SELECT array_agg(r) FROM jsonb_populate_recordset(NULL::{}, ${}::jsonb) AS r)",
                element, index
            ),
            None => format!("jsonb_populate_record(NULL::{}, ${}::jsonb)", type_name, index),
        });
    }

    Ok(format!("${}::{}", index, type_name))
}

/// Rewrite `@name` placeholders to `$n`. Falls back to binding every non
/// return-value parameter positionally when the text names none of them.
fn text_statement(command: &SqlCommand) -> Statement {
    let (sql, values) = rewrite_named_placeholders(&command.text, &command.parameters);
    Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
}

fn rewrite_named_placeholders(text: &str, parameters: &[SqlParameter]) -> (String, Vec<Value>) {
    let chars: Vec<char> = text.chars().collect();
    let mut sql = String::with_capacity(text.len());
    let mut bound: Vec<usize> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        // `$` after an identifier character is part of the identifier.
        let after_word = i > 0 && is_word_char(chars[i - 1]);
        let verbatim = if chars[i] == '$' && after_word {
            0
        } else {
            verbatim_len(&chars[i..])
        };
        if verbatim > 0 {
            sql.extend(&chars[i..i + verbatim]);
            i += verbatim;
            continue;
        }

        if chars[i] != '@' {
            sql.push(chars[i]);
            i += 1;
            continue;
        }
        if chars.get(i + 1) == Some(&'@') {
            sql.push_str("@@");
            i += 2;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < chars.len() && is_word_char(chars[end]) {
            end += 1;
        }
        let name: String = chars[start..end].iter().collect();
        i = end;

        let found = parameters.iter().position(|p| {
            p.direction != ParameterDirection::ReturnValue && p.name.eq_ignore_ascii_case(&name)
        });
        match found {
            Some(index) => {
                let slot = match bound.iter().position(|&b| b == index) {
                    Some(slot) => slot,
                    None => {
                        bound.push(index);
                        bound.len() - 1
                    }
                };
                sql.push_str(&cast_suffix(&parameters[index], slot + 1));
            }
            None => {
                sql.push('@');
                sql.push_str(&name);
            }
        }
    }

    if bound.is_empty() {
        bound = parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.direction != ParameterDirection::ReturnValue)
            .map(|(i, _)| i)
            .collect();
    }

    let values = bound
        .into_iter()
        .map(|i| to_db_value(parameters[i].value.as_ref().unwrap_or(&SqlValue::Null)))
        .collect();
    (sql, values)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Length of the string literal, quoted identifier, comment or dollar-quoted
/// body starting at `rest[0]`; 0 when none starts there.
fn verbatim_len(rest: &[char]) -> usize {
    match rest {
        ['\'', ..] | ['"', ..] => rest[1..]
            .iter()
            .position(|&c| c == rest[0])
            .map_or(rest.len(), |p| p + 2),
        ['-', '-', ..] => rest
            .iter()
            .position(|&c| c == '\n')
            .map_or(rest.len(), |p| p + 1),
        ['/', '*', ..] => block_comment_len(rest),
        ['$', ..] => dollar_quote_len(rest),
        _ => 0,
    }
}

/// Block comments nest.
fn block_comment_len(rest: &[char]) -> usize {
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < rest.len() {
        match (rest[i], rest[i + 1]) {
            ('/', '*') => {
                depth += 1;
                i += 2;
            }
            ('*', '/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    rest.len()
}

/// `$tag$ ... $tag$`; `$1` and other non-tags yield 0.
fn dollar_quote_len(rest: &[char]) -> usize {
    let tag_len = match rest[1..].iter().position(|&c| c == '$') {
        Some(n) => n,
        None => return 0,
    };
    let tag = &rest[1..=tag_len];
    let valid = tag.first().map_or(true, |c| !c.is_ascii_digit())
        && tag.iter().all(|&c| is_word_char(c));
    if !valid {
        return 0;
    }

    let delimiter = &rest[..tag_len + 2];
    rest[delimiter.len()..]
        .windows(delimiter.len())
        .position(|w| w == delimiter)
        .map_or(rest.len(), |p| p + 2 * delimiter.len())
}

fn cast_suffix(parameter: &SqlParameter, index: usize) -> String {
    match checked_type_name(&parameter.type_name) {
        Ok(type_name) if !type_name.is_empty() && !parameter.is_structured() => {
            format!("(${}::{})", index, type_name)
        }
        _ => format!("${}", index),
    }
}

/// Build the `CALL` / `SELECT * FROM` statement for a routine.
fn routine_statement(
    routine: &RoutineName,
    kind: RoutineKind,
    parameters: &[SqlParameter],
) -> AppResult<Statement> {
    let sends = |p: &SqlParameter| match p.direction {
        ParameterDirection::ReturnValue => false,
        ParameterDirection::Output => kind == RoutineKind::Procedure,
        ParameterDirection::InputOutput => true,
        ParameterDirection::Input => true,
    };
    let candidates: Vec<&SqlParameter> = parameters.iter().filter(|p| sends(p)).collect();
    let named = candidates.iter().all(|p| !p.name.is_empty());

    let mut args = Vec::new();
    let mut values = Vec::new();
    for p in candidates {
        // Unset inputs are left out so the routine default applies.
        if named && p.direction == ParameterDirection::Input && p.value.is_none() {
            continue;
        }
        let index = values.len() + 1;
        let expr = placeholder(p, index)?;
        args.push(if named {
            format!("{} => {}", quote_ident(&p.name), expr)
        } else {
            expr
        });
        values.push(to_db_value(p.value.as_ref().unwrap_or(&SqlValue::Null)));
    }

    let sql = match kind {
        RoutineKind::Procedure => format!("CALL {}({})", routine.quoted(), args.join(", ")),
        RoutineKind::Function => {
            format!("SELECT * FROM {}({})", routine.quoted(), args.join(", "))
        }
    };
    Ok(Statement::from_sql_and_values(DbBackend::Postgres, sql, values))
}

async fn routine_kind(txn: &DatabaseTransaction, routine: &RoutineName, text: &str) -> AppResult<RoutineKind> {
    let row = txn
        .query_one(Statement::from_sql_and_values(
            DbBackend::Postgres,
            ROUTINE_KIND_QUERY,
            routine.lookup_values(),
        ))
        .await?
        .ok_or_else(|| AppError::ProcedureNotFound(text.to_string()))?;
    Ok(RoutineKind::from_prokind(row.try_get::<Option<String>>("", "kind")?))
}

async fn call_routine(
    txn: &DatabaseTransaction,
    command: &mut SqlCommand,
) -> AppResult<(RoutineKind, DataTable)> {
    let routine = RoutineName::parse(&command.text)?;
    let kind = routine_kind(txn, &routine, &command.text).await?;
    let statement = routine_statement(&routine, kind, &command.parameters)?;

    tracing::debug!(routine = %command.text, sql = %statement.sql, "Calling routine");

    let rows = txn.query_all(statement).await?;
    let table = table_from_rows(&rows)?;
    capture_outputs(kind, &table, &mut command.parameters);
    Ok((kind, table))
}

/// Positional access to one result row.
trait ResultRow {
    fn column_names(&self) -> Vec<String>;

    /// Cell at `index`, or `None` when its type has no JSON mapping.
    fn cell(&self, index: usize) -> Option<JsonValue>;
}

impl ResultRow for QueryResult {
    fn column_names(&self) -> Vec<String> {
        QueryResult::column_names(self)
    }

    fn cell(&self, index: usize) -> Option<JsonValue> {
        // NULL decodes as `None` for every type, so the first attempt covers it.
        macro_rules! decode {
            ($ty:ty, $to_json:expr) => {
                if let Ok(value) = self.try_get_by_index::<Option<$ty>>(index) {
                    return match value {
                        Some(v) => $to_json(v),
                        None => Some(JsonValue::Null),
                    };
                }
            };
        }

        decode!(bool, |v: bool| Some(JsonValue::Bool(v)));
        decode!(i16, |v: i16| Some(JsonValue::from(v)));
        decode!(i32, |v: i32| Some(JsonValue::from(v)));
        decode!(i64, |v: i64| Some(JsonValue::from(v)));
        decode!(f32, |v: f32| Some(JsonValue::from(v)));
        decode!(f64, |v: f64| Some(JsonValue::from(v)));
        decode!(Decimal, |v: Decimal| {
            v.to_string().parse::<serde_json::Number>().ok().map(JsonValue::Number)
        });
        decode!(String, |v: String| Some(JsonValue::String(v)));
        decode!(JsonValue, Some);
        decode!(Uuid, |v: Uuid| Some(JsonValue::String(v.to_string())));
        decode!(ChronoDateTimeWithTimeZone, |v: ChronoDateTimeWithTimeZone| Some(
            JsonValue::String(v.to_rfc3339())
        ));
        decode!(ChronoDateTime, |v: ChronoDateTime| serde_json::to_value(v).ok());
        decode!(ChronoDate, |v: ChronoDate| serde_json::to_value(v).ok());
        decode!(ChronoTime, |v: ChronoTime| serde_json::to_value(v).ok());
        decode!(Vec<u8>, |v: Vec<u8>| Some(JsonValue::from(v)));
        None
    }
}

/// Read every row by position. Duplicate column names are kept; a column
/// whose type cannot be read fails the whole result.
///
/// Column names come from the first row, so an empty result has no columns.
fn table_from_rows<R: ResultRow>(rows: &[R]) -> AppResult<DataTable> {
    let columns = rows.first().map(ResultRow::column_names).unwrap_or_default();

    let mut cells = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            let value = row.cell(index).ok_or_else(|| {
                AppError::conversion(format!(
                    "column {} (\"{}\") has a type with no JSON mapping; cast it to text",
                    index + 1,
                    column
                ))
            })?;
            values.push(value);
        }
        cells.push(values);
    }
    Ok(DataTable::new(columns, cells))
}

/// Copy values from the first returned row into output and return-value parameters.
fn capture_outputs(kind: RoutineKind, table: &DataTable, parameters: &mut [SqlParameter]) {
    if table.is_empty() {
        return;
    }

    let output_count = parameters.iter().filter(|p| p.direction.is_output()).count();
    let positional = kind == RoutineKind::Procedure && output_count == table.columns.len();

    let mut ordinal = 0;
    for p in parameters.iter_mut() {
        if p.direction == ParameterDirection::ReturnValue {
            if kind == RoutineKind::Function {
                if let Some(cell) = table.first_cell() {
                    p.value = Some(SqlValue::from_json(cell.clone()));
                }
            }
            continue;
        }
        if !p.direction.is_output() {
            continue;
        }

        let column = table
            .column_index(&p.name)
            .or(if positional { Some(ordinal) } else { None });
        if let Some(cell) = column.and_then(|c| table.cell(0, c)) {
            p.value = Some(SqlValue::from_json(cell.clone()));
        }
        ordinal += 1;
    }
}

fn parameter_from_row(row: &QueryResult) -> AppResult<Option<SqlParameter>> {
    let mode = match row.try_get::<Option<String>>("", "mode")? {
        Some(mode) => mode,
        // Routine without arguments: the lateral join produced a null row.
        None => return Ok(None),
    };
    let name = row.try_get::<Option<String>>("", "name")?.unwrap_or_default();
    let type_name = row
        .try_get::<Option<String>>("", "type_name")?
        .unwrap_or_default();
    let type_kind = row.try_get::<Option<String>>("", "type_kind")?;
    let element_kind = row.try_get::<Option<String>>("", "element_kind")?;

    let direction = match mode.as_str() {
        "o" | "t" => ParameterDirection::Output,
        "b" => ParameterDirection::InputOutput,
        _ => ParameterDirection::Input,
    };
    let sql_type = if type_kind.as_deref() == Some("c") || element_kind.as_deref() == Some("c") {
        SqlType::Structured
    } else {
        SqlType::from_pg(&type_name)
    };

    Ok(Some(SqlParameter::typed(name, direction, sql_type, type_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_routine_name_folds_unquoted_parts() {
        let name = RoutineName::parse("Sales.GetOrders").unwrap();
        assert_eq!(name.schema.as_deref(), Some("sales"));
        assert_eq!(name.name, "getorders");
        assert_eq!(name.quoted(), "\"sales\".\"getorders\"");

        let quoted = RoutineName::parse("\"Sales\".\"Get\"\"Orders\"").unwrap();
        assert_eq!(quoted.name, "Get\"Orders");
        assert_eq!(quoted.quoted(), "\"Sales\".\"Get\"\"Orders\"");
    }

    #[test]
    fn test_routine_name_rejects_injection() {
        assert!(RoutineName::parse("p(); DROP TABLE x").is_err());
        assert!(RoutineName::parse("a..b").is_err());
        assert!(RoutineName::parse("a.b.c").is_err());
    }

    #[test]
    fn test_named_placeholders_are_rewritten() {
        let params = vec![
            SqlParameter::new("@id", 7).with_type(SqlType::Integer, "integer"),
            SqlParameter::new("name", "x"),
        ];
        let (sql, values) = rewrite_named_placeholders(
            "SELECT '@id', @@VERSION WHERE id = @id AND name = @Name OR id = @id",
            &params,
        );

        assert_eq!(
            sql,
            "SELECT '@id', @@VERSION WHERE id = ($1::integer) AND name = $2 OR id = ($1::integer)"
        );
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_placeholders_in_comments_and_dollar_bodies_are_kept() {
        let params = vec![SqlParameter::new("id", 7)];
        let text = "SELECT @id -- filter on @id\n\
                    /* @id /* nested @id */ still @id */ \
                    , $$ RETURN @id; $$, $fn$ @id $fn$, $1, @id";
        let (sql, values) = rewrite_named_placeholders(text, &params);

        assert_eq!(
            sql,
            "SELECT $1 -- filter on @id\n\
             /* @id /* nested @id */ still @id */ \
             , $$ RETURN @id; $$, $fn$ @id $fn$, $1, $1"
        );
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_unterminated_comment_is_copied_to_the_end() {
        let params = vec![SqlParameter::new("id", 7)];
        let (sql, _) = rewrite_named_placeholders("SELECT @id /* @id", &params);
        assert_eq!(sql, "SELECT $1 /* @id");
    }

    #[test]
    fn test_positional_binding_without_placeholders() {
        let params = vec![SqlParameter::new("a", 1), SqlParameter::new("b", 2)];
        let (sql, values) = rewrite_named_placeholders("SELECT $1 + $2", &params);
        assert_eq!(sql, "SELECT $1 + $2");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_procedure_call_omits_unset_inputs() {
        let routine = RoutineName::parse("public.bump").unwrap();
        let params = vec![
            SqlParameter::new("amount", 3).with_type(SqlType::Integer, "integer"),
            SqlParameter::typed("note", ParameterDirection::Input, SqlType::Text, "text"),
            SqlParameter::output("total", "integer"),
        ];
        let statement = routine_statement(&routine, RoutineKind::Procedure, &params).unwrap();

        assert_eq!(
            statement.sql,
            "CALL \"public\".\"bump\"(\"amount\" => $1::integer, \"total\" => $2::integer)"
        );
    }

    #[test]
    fn test_function_call_skips_outputs_and_expands_table_types() {
        let routine = RoutineName::parse("load_lines").unwrap();
        let params = vec![
            SqlParameter::new("lines", json!([{"sku": "a", "qty": 1}]))
                .with_type(SqlType::Structured, "public.order_line[]"),
            SqlParameter::output("inserted", "integer"),
        ];
        let statement = routine_statement(&routine, RoutineKind::Function, &params).unwrap();

        assert_eq!(
            statement.sql,
            "SELECT * FROM \"load_lines\"(\"lines\" => (SELECT array_agg(r) FROM jsonb_populate_recordset(NULL::public.order_line, $1::jsonb) AS r))"
        );
    }

    #[test]
    fn test_bad_type_name_is_rejected() {
        let routine = RoutineName::parse("p").unwrap();
        let params = vec![SqlParameter::new("a", 1).with_type(SqlType::Other, "int; DROP")];
        assert!(matches!(
            routine_statement(&routine, RoutineKind::Function, &params),
            Err(AppError::MalformedTypeName(_))
        ));
    }

    struct FakeRow {
        columns: Vec<&'static str>,
        cells: Vec<Option<JsonValue>>,
    }

    impl ResultRow for FakeRow {
        fn column_names(&self) -> Vec<String> {
            self.columns.iter().map(|c| c.to_string()).collect()
        }

        fn cell(&self, index: usize) -> Option<JsonValue> {
            self.cells.get(index).cloned().flatten()
        }
    }

    #[test]
    fn test_duplicate_column_names_are_kept() {
        let rows = vec![
            FakeRow {
                columns: vec!["?column?", "?column?", "id"],
                cells: vec![Some(json!(1)), Some(json!(2)), Some(json!(9))],
            },
            FakeRow {
                columns: vec!["?column?", "?column?", "id"],
                cells: vec![Some(json!(3)), Some(JsonValue::Null), Some(json!(8))],
            },
        ];
        let table = table_from_rows(&rows).unwrap();

        assert_eq!(table.columns, vec!["?column?", "?column?", "id"]);
        assert_eq!(table.rows[0], vec![json!(1), json!(2), json!(9)]);
        assert_eq!(table.rows[1], vec![json!(3), JsonValue::Null, json!(8)]);
        assert_eq!(table.first_cell(), Some(&json!(1)));
        assert_eq!(table.column_index("?column?"), Some(0));
    }

    #[test]
    fn test_unmapped_column_type_fails_the_result() {
        let rows = vec![FakeRow {
            columns: vec!["elapsed", "id"],
            cells: vec![None, Some(json!(1))],
        }];

        match table_from_rows(&rows) {
            Err(AppError::Conversion(msg)) => assert!(msg.contains("elapsed")),
            other => panic!("expected conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_result_has_no_columns() {
        let table = table_from_rows::<FakeRow>(&[]).unwrap();
        assert!(table.columns.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_capture_outputs_by_name_and_position() {
        let table = DataTable::from_records(vec![json!({"total": 10, "label": "ok"})]);
        let mut params = vec![
            SqlParameter::new("amount", 3),
            SqlParameter::output("label", "text"),
            SqlParameter::output("total", "integer"),
        ];
        capture_outputs(RoutineKind::Procedure, &table, &mut params);
        assert_eq!(params[1].value, Some(SqlValue::Text("ok".into())));
        assert_eq!(params[2].value, Some(SqlValue::Int(10)));

        let unnamed = DataTable::from_records(vec![json!({"column1": 5})]);
        let mut params = vec![SqlParameter::output("x", "integer")];
        capture_outputs(RoutineKind::Procedure, &unnamed, &mut params);
        assert_eq!(params[0].value, Some(SqlValue::Int(5)));
    }
}
