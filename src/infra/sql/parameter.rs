//! Command parameters and the values bound to them.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Direction of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDirection {
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// True for parameters whose value is written back after execution.
    pub fn is_output(self) -> bool {
        matches!(self, ParameterDirection::Output | ParameterDirection::InputOutput)
    }

    /// True for parameters whose value is sent to the server.
    pub fn is_input(self) -> bool {
        matches!(self, ParameterDirection::Input | ParameterDirection::InputOutput)
    }
}

/// Broad category of a parameter's declared database type.
///
/// The exact database type lives in [`SqlParameter::type_name`]; this enum only
/// drives binding decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Boolean,
    Integer,
    Decimal,
    Float,
    Text,
    Temporal,
    Json,
    Binary,
    /// Table-valued (composite or array of composite) parameter.
    Structured,
    Other,
}

impl SqlType {
    /// Classify a PostgreSQL catalog type name.
    pub fn from_pg(data_type: &str) -> Self {
        match data_type {
            "boolean" => SqlType::Boolean,
            "smallint" | "integer" | "bigint" => SqlType::Integer,
            "numeric" | "money" => SqlType::Decimal,
            "real" | "double precision" => SqlType::Float,
            "text" | "character varying" | "character" | "name" | "citext" | "uuid" => {
                SqlType::Text
            }
            "date"
            | "time without time zone"
            | "time with time zone"
            | "timestamp without time zone"
            | "timestamp with time zone"
            | "interval" => SqlType::Temporal,
            "json" | "jsonb" => SqlType::Json,
            "bytea" => SqlType::Binary,
            "USER-DEFINED" => SqlType::Structured,
            _ => SqlType::Other,
        }
    }
}

/// A value bound to (or read back from) a parameter.
///
/// `SqlValue::Null` is the explicit "no value" marker. An unset parameter is
/// represented by `None` on [`SqlParameter::value`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(JsonValue),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Convert a cell read from a result row.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(b) => SqlValue::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => SqlValue::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => SqlValue::Text(s),
            other => SqlValue::Json(other),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Bool(b) => JsonValue::Bool(*b),
            SqlValue::Int(i) => JsonValue::from(*i),
            SqlValue::Float(f) => JsonValue::from(*f),
            SqlValue::Text(s) => JsonValue::String(s.clone()),
            SqlValue::Json(v) => v.clone(),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        SqlValue::Json(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// A single command parameter.
///
/// Plain owned data: cloning yields a fully independent copy, which is what the
/// parameter cache hands out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameter {
    pub name: String,
    pub direction: ParameterDirection,
    pub sql_type: SqlType,
    /// Database type name used for casts, e.g. `integer` or `public.order_line[]`.
    pub type_name: String,
    pub value: Option<SqlValue>,
}

impl SqlParameter {
    /// Input parameter with an explicit value. A leading `@` on the name is dropped.
    pub fn new(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            name: normalize_name(name.into()),
            direction: ParameterDirection::Input,
            sql_type: SqlType::Other,
            type_name: String::new(),
            value: Some(value.into()),
        }
    }

    /// Parameter with a declared type and no value.
    pub fn typed(
        name: impl Into<String>,
        direction: ParameterDirection,
        sql_type: SqlType,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            name: normalize_name(name.into()),
            direction,
            sql_type,
            type_name: type_name.into(),
            value: None,
        }
    }

    /// Output parameter of the given database type.
    pub fn output(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let sql_type = SqlType::from_pg(&type_name);
        Self::typed(name, ParameterDirection::Output, sql_type, type_name)
    }

    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_type(mut self, sql_type: SqlType, type_name: impl Into<String>) -> Self {
        self.sql_type = sql_type;
        self.type_name = type_name.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<SqlValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn is_structured(&self) -> bool {
        self.sql_type == SqlType::Structured
    }
}

fn normalize_name(name: String) -> String {
    match name.strip_prefix('@') {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_name_prefix_is_dropped() {
        let p = SqlParameter::new("@id", 5);
        assert_eq!(p.name, "id");
        assert_eq!(p.value, Some(SqlValue::Int(5)));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = SqlParameter::output("total", "integer");
        let mut copy = original.clone();
        copy.value = Some(SqlValue::Int(10));

        assert_eq!(original.value, None);
        assert_eq!(copy.value, Some(SqlValue::Int(10)));
    }

    #[test]
    fn test_from_json_keeps_integers() {
        assert_eq!(SqlValue::from_json(json!(3)), SqlValue::Int(3));
        assert_eq!(SqlValue::from_json(json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(SqlValue::from_json(json!(null)), SqlValue::Null);
        assert_eq!(
            SqlValue::from_json(json!([1, 2])),
            SqlValue::Json(json!([1, 2]))
        );
    }

    #[test]
    fn test_option_maps_to_null() {
        let none: Option<i64> = None;
        assert_eq!(SqlValue::from(none), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
    }

    #[test]
    fn test_direction_flags() {
        assert!(ParameterDirection::InputOutput.is_output());
        assert!(ParameterDirection::InputOutput.is_input());
        assert!(!ParameterDirection::ReturnValue.is_output());
        assert!(!ParameterDirection::Output.is_input());
    }
}
