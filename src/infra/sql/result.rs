//! Tabular results returned by the SQL helper.

use serde::Serialize;
use serde_json::Value as JsonValue;

use super::parameter::SqlParameter;

/// A single result table: ordered column names and rows of cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl DataTable {
    /// Build a table from positional rows. Column names may repeat.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self { columns, rows }
    }

    /// Build a table from row objects, keeping the key order of the first row.
    /// Keys are unique, so this cannot express repeated column names.
    pub fn from_records(records: Vec<JsonValue>) -> Self {
        let columns: Vec<String> = match records.first() {
            Some(JsonValue::Object(first)) => first.keys().cloned().collect(),
            _ => Vec::new(),
        };

        let rows = records
            .into_iter()
            .map(|record| match record {
                JsonValue::Object(mut map) => columns
                    .iter()
                    .map(|c| map.remove(c).unwrap_or(JsonValue::Null))
                    .collect(),
                other => vec![other],
            })
            .collect();

        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Cell at (row, column), if present.
    pub fn cell(&self, row: usize, column: usize) -> Option<&JsonValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// First cell of the first row.
    pub fn first_cell(&self) -> Option<&JsonValue> {
        self.cell(0, 0)
    }
}

/// An ordered collection of result tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataSet {
    pub tables: Vec<DataTable>,
}

impl DataSet {
    pub fn new(tables: Vec<DataTable>) -> Self {
        Self { tables }
    }

    pub fn single(table: DataTable) -> Self {
        Self {
            tables: vec![table],
        }
    }

    pub fn first_table(&self) -> Option<&DataTable> {
        self.tables.first()
    }

    /// First cell of the first table, if any row came back.
    pub fn first_cell(&self) -> Option<&JsonValue> {
        self.first_table().and_then(DataTable::first_cell)
    }

    /// True when the first table holds at least one row.
    pub fn has_rows(&self) -> bool {
        self.first_table().map(|t| !t.is_empty()).unwrap_or(false)
    }
}

/// A result paired with the output parameters of the command that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultWithOutputParameters<T> {
    pub result: T,
    pub output_parameters: Vec<SqlParameter>,
}

impl<T> ResultWithOutputParameters<T> {
    pub fn new(result: T, output_parameters: Vec<SqlParameter>) -> Self {
        Self {
            result,
            output_parameters,
        }
    }

    /// Output parameter by name (leading `@` ignored).
    pub fn output(&self, name: &str) -> Option<&SqlParameter> {
        let name = name.trim_start_matches('@');
        self.output_parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_records_keeps_column_order() {
        let table = DataTable::from_records(vec![
            json!({"zeta": 1, "alpha": "a"}),
            json!({"alpha": "b", "zeta": 2}),
        ]);

        assert_eq!(table.columns, vec!["zeta", "alpha"]);
        assert_eq!(table.rows[1], vec![json!(2), json!("b")]);
        assert_eq!(table.first_cell(), Some(&json!(1)));
    }

    #[test]
    fn test_has_rows() {
        assert!(!DataSet::default().has_rows());
        assert!(!DataSet::single(DataTable::default()).has_rows());
        let ds = DataSet::single(DataTable::from_records(vec![json!({"n": 1})]));
        assert!(ds.has_rows());
    }
}
