use crate::query::cell::Row;
use crate::query::execution_state::ExecutionState;
use crate::query::field_type::SchemaField;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Property key for the execution duration in milliseconds.
pub const EXECUTION_TIME: &str = "executionTime";
/// Property key for the original statement text.
pub const QUERY: &str = "query";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryError {
    pub message: String,
    pub sql_state: Option<String>,
    pub error_code: Option<i32>,
    pub error_line: Option<u32>,
    pub char_position_in_line: Option<u32>,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
            error_code: None,
            error_line: None,
            char_position_in_line: None,
        }
    }

    pub fn with_sql_state(mut self, sql_state: Option<String>) -> Self {
        self.sql_state = sql_state;
        self
    }

    pub fn with_error_code(mut self, error_code: Option<i32>) -> Self {
        self.error_code = error_code;
        self
    }

    pub fn with_location(mut self, line: u32, column: u32) -> Self {
        self.error_line = Some(line);
        self.char_position_in_line = Some(column);
        self
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = self.error_code {
            write!(f, " (code {code}")?;
            if let Some(state) = &self.sql_state {
                write!(f, ", sql state {state}")?;
            }
            write!(f, ")")?;
        }
        if let (Some(line), Some(column)) = (self.error_line, self.char_position_in_line) {
            write!(f, " at line {line}:{column}")?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryError {}

/// Terminal outcome of one execution. Built only through [`QueryResult::success`]
/// and [`QueryResult::error`], so a success never carries an error and a
/// failure never carries rows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryResult {
    state: ExecutionState,
    columns: Vec<SchemaField>,
    rows: Vec<Row>,
    error: Option<QueryError>,
    properties: BTreeMap<String, serde_json::Value>,
}

impl QueryResult {
    pub fn success(
        columns: Vec<SchemaField>,
        rows: Vec<Row>,
        properties: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            state: ExecutionState::Succeeded,
            columns,
            rows,
            error: None,
            properties,
        }
    }

    pub fn error(state: ExecutionState, error: QueryError, query: &str) -> Self {
        assert!(
            state.is_terminal() && state != ExecutionState::Succeeded,
            "Invalid failure state: {state:?}"
        );
        Self {
            state,
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(error),
            properties: BTreeMap::from([(QUERY.to_owned(), serde_json::Value::from(query))]),
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_details(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    pub fn columns(&self) -> &[SchemaField] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn properties(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.properties
    }

    pub fn execution_time_millis(&self) -> Option<u64> {
        self.properties.get(EXECUTION_TIME).and_then(|v| v.as_u64())
    }

    pub fn query(&self) -> Option<&str> {
        self.properties.get(QUERY).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::cell::Cell;
    use crate::query::field_type::FieldType;

    #[test]
    fn error_result_keeps_statement() {
        let result = QueryResult::error(
            ExecutionState::Aborted,
            QueryError::new("Query aborted by user"),
            "select 1",
        );
        assert!(result.is_failed());
        assert_eq!(result.state(), ExecutionState::Aborted);
        assert_eq!(result.query(), Some("select 1"));
        assert!(result.rows().is_empty());
    }

    #[test]
    #[should_panic]
    fn error_result_rejects_success_state() {
        QueryResult::error(ExecutionState::Succeeded, QueryError::new("x"), "select 1");
    }

    #[test]
    fn success_result_exposes_metadata() {
        let result = QueryResult::success(
            vec![SchemaField::new("a", FieldType::Long)],
            vec![vec![Cell::from(serde_json::json!(1))]],
            BTreeMap::from([
                (EXECUTION_TIME.to_owned(), serde_json::json!(42)),
                (QUERY.to_owned(), serde_json::json!("select a")),
            ]),
        );
        assert!(!result.is_failed());
        assert_eq!(result.execution_time_millis(), Some(42));
        assert_eq!(result.query(), Some("select a"));
    }

    #[test]
    fn error_display_includes_code_and_location() {
        let error = QueryError::new("line 1:8: Column 'x' cannot be resolved")
            .with_error_code(Some(47))
            .with_sql_state(Some("42S22".to_owned()))
            .with_location(1, 8);
        assert_eq!(
            error.to_string(),
            "line 1:8: Column 'x' cannot be resolved (code 47, sql state 42S22) at line 1:8"
        );
    }
}
