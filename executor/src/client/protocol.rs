use model::query::QueryError;
use serde::Deserialize;
use serde_json::Value;

/// One batch of the REST statement protocol: the answer to the initial
/// `POST` and to every following `GET nextUri`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    pub id: String,
    #[serde(default)]
    pub info_uri: Option<String>,
    #[serde(default)]
    pub partial_cancel_uri: Option<String>,
    #[serde(default)]
    pub next_uri: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<Column>>,
    #[serde(default)]
    pub data: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    pub stats: StatementStats,
    #[serde(default)]
    pub error: Option<RemoteError>,
    #[serde(default)]
    pub update_type: Option<String>,
    #[serde(default)]
    pub update_count: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub type_signature: ClientTypeSignature,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTypeSignature {
    pub raw_type: String,
    #[serde(default)]
    pub arguments: Vec<ClientTypeSignatureParameter>,
}

impl ClientTypeSignature {
    /// Raw type names of the type-valued arguments, in declaration order.
    /// Literal, named and variable arguments are skipped.
    pub fn type_argument_names(&self) -> impl Iterator<Item = &str> {
        self.arguments
            .iter()
            .filter(|argument| argument.kind == ParameterKind::Type)
            .filter_map(|argument| argument.value.get("rawType").and_then(Value::as_str))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ClientTypeSignatureParameter {
    pub kind: ParameterKind,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum ParameterKind {
    #[serde(rename = "TYPE", alias = "TYPE_SIGNATURE")]
    Type,
    #[serde(rename = "NAMED_TYPE", alias = "NAMED_TYPE_SIGNATURE")]
    NamedType,
    #[serde(rename = "LONG", alias = "LONG_LITERAL")]
    Long,
    #[serde(rename = "VARIABLE")]
    Variable,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatementStats {
    pub state: String,
    pub scheduled: bool,
    pub nodes: u32,
    pub total_splits: u32,
    pub queued_splits: u32,
    pub running_splits: u32,
    pub completed_splits: u32,
    pub user_time_millis: u64,
    pub cpu_time_millis: u64,
    pub wall_time_millis: u64,
    pub processed_rows: u64,
    pub processed_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sql_state: Option<String>,
    #[serde(default)]
    pub error_code: Option<i32>,
    #[serde(default)]
    pub error_name: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_location: Option<ErrorLocation>,
    #[serde(default)]
    pub failure_info: Option<FailureInfo>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLocation {
    pub line_number: u32,
    pub column_number: u32,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FailureInfo {
    #[serde(rename = "type")]
    pub failure_type: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl RemoteError {
    /// The failure message, falling back to the failure type and then to
    /// the top-level message.
    pub fn display_message(&self) -> String {
        match &self.failure_info {
            Some(FailureInfo {
                message: Some(message),
                ..
            }) => message.clone(),
            Some(FailureInfo { failure_type, .. }) => failure_type.clone(),
            None => self
                .message
                .clone()
                .unwrap_or_else(|| "Query failed without an error message".to_owned()),
        }
    }

    pub fn to_query_error(&self) -> QueryError {
        let error = QueryError::new(self.display_message())
            .with_sql_state(self.sql_state.clone())
            .with_error_code(self.error_code);
        match self.error_location {
            Some(location) => error.with_location(location.line_number, location.column_number),
            None => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_running_batch() {
        let batch: QueryResults = serde_json::from_value(json!({
            "id": "20261016_093000_00001_abcde",
            "infoUri": "http://engine:8080/ui/query.html?20261016_093000_00001_abcde",
            "nextUri": "http://engine:8080/v1/statement/20261016_093000_00001_abcde/2",
            "columns": [
                {
                    "name": "tags",
                    "type": "array(varchar)",
                    "typeSignature": {
                        "rawType": "array",
                        "arguments": [{
                            "kind": "TYPE_SIGNATURE",
                            "value": {"rawType": "varchar", "arguments": [
                                {"kind": "LONG_LITERAL", "value": 2147483647}
                            ]}
                        }]
                    }
                }
            ],
            "data": [[["a", "b"]], [null]],
            "stats": {
                "state": "RUNNING",
                "scheduled": true,
                "nodes": 3,
                "totalSplits": 10,
                "completedSplits": 4,
                "processedRows": 1200,
                "unknownCounter": 17
            }
        }))
        .unwrap();

        assert_eq!(batch.stats.state, "RUNNING");
        assert_eq!(batch.stats.completed_splits, 4);
        assert_eq!(batch.data.as_ref().map(Vec::len), Some(2));

        let column = &batch.columns.as_ref().unwrap()[0];
        assert_eq!(column.type_name, "array(varchar)");
        assert_eq!(
            column.type_signature.type_argument_names().collect::<Vec<_>>(),
            vec!["varchar"]
        );
    }

    #[test]
    fn literal_arguments_are_not_type_arguments() {
        let signature: ClientTypeSignature = serde_json::from_value(json!({
            "rawType": "decimal",
            "arguments": [
                {"kind": "LONG", "value": 10},
                {"kind": "LONG", "value": 2}
            ]
        }))
        .unwrap();
        assert_eq!(signature.type_argument_names().count(), 0);
    }

    #[test]
    fn remote_error_prefers_failure_message() {
        let error: RemoteError = serde_json::from_value(json!({
            "message": "outer",
            "sqlState": "42000",
            "errorCode": 1,
            "errorLocation": {"lineNumber": 1, "columnNumber": 8},
            "failureInfo": {"type": "com.facebook.presto.sql.parser.ParsingException", "message": "line 1:8: mismatched input"}
        }))
        .unwrap();

        let query_error = error.to_query_error();
        assert_eq!(query_error.message, "line 1:8: mismatched input");
        assert_eq!(query_error.sql_state.as_deref(), Some("42000"));
        assert_eq!(query_error.error_code, Some(1));
        assert_eq!(query_error.error_line, Some(1));
        assert_eq!(query_error.char_position_in_line, Some(8));
    }

    #[test]
    fn remote_error_falls_back_to_failure_type_then_message() {
        let typed: RemoteError = serde_json::from_value(json!({
            "message": "outer",
            "failureInfo": {"type": "java.lang.OutOfMemoryError"}
        }))
        .unwrap();
        assert_eq!(typed.display_message(), "java.lang.OutOfMemoryError");

        let bare: RemoteError = serde_json::from_value(json!({"message": "outer"})).unwrap();
        let query_error = bare.to_query_error();
        assert_eq!(query_error.message, "outer");
        assert_eq!(query_error.error_line, None);
    }
}
