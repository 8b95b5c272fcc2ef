//! Normalization of catalog tool payloads.
//!
//! MCP servers return tool output either as structured content or as JSON
//! text in the first content block. Both shapes are reduced to one
//! `serde_json::Value` and then mapped onto the gateway types.

use serde_json::{Map, Value};

use supportdesk_core::error::{Result, SupportError};
use supportdesk_core::types::{CatalogList, QueryOutcome, SchemaInfo};

/// Pick the payload of a tool result: structured content wins, then the
/// first text block parsed as JSON. Anything else yields `Value::Null`.
pub fn tool_payload(structured: Option<Value>, texts: &[String]) -> Value {
    if let Some(value) = structured.filter(|v| !v.is_null()) {
        return unwrap_result_wrapper(value);
    }
    texts
        .first()
        .and_then(|t| serde_json::from_str::<Value>(t.trim()).ok())
        .unwrap_or(Value::Null)
}

/// Some servers wrap a non-object return value as `{"result": <value>}` in
/// structured content. A wrapped object is unwrapped; `run_sql` output,
/// whose `result` is an array, is left alone.
fn unwrap_result_wrapper(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.get("result").is_some_and(Value::is_object) => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn error_message(payload: &Value) -> Option<String> {
    match payload.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn unrecognized(tool: &str, payload: &Value) -> SupportError {
    SupportError::ToolExecution {
        tool: tool.into(),
        message: format!("unrecognized {} payload: {}", tool, payload),
    }
}

/// `{"databases": [...]}`.
pub fn catalog_list(payload: &Value) -> Result<CatalogList> {
    if let Some(error) = error_message(payload) {
        return Err(SupportError::ToolExecution {
            tool: "list_databases".into(),
            message: error,
        });
    }
    let Some(names) = payload.get("databases") else {
        return Err(unrecognized("list_databases", payload));
    };
    Ok(CatalogList {
        names: string_list(Some(names)),
    })
}

/// `{"schema": [...]}`; an error payload means the catalog does not exist.
pub fn schema_info(name: &str, payload: &Value) -> Result<SchemaInfo> {
    if let Some(error) = error_message(payload) {
        return Err(SupportError::NotFound(format!("database '{}': {}", name, error)));
    }
    let Some(statements) = payload.get("schema") else {
        return Err(unrecognized("get_schema", payload));
    };
    Ok(SchemaInfo {
        statements: string_list(Some(statements)),
    })
}

/// `{"result": [{col: value, ...}, ...]}` or `{"error": "..."}`.
///
/// Column order follows the keys of the first row. A payload with neither
/// key is a failure, never an empty result.
pub fn query_outcome(payload: &Value) -> QueryOutcome {
    if let Some(error) = error_message(payload) {
        return QueryOutcome::Failed { error };
    }
    let rows: Vec<Map<String, Value>> = match payload.get("result") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|row| row.as_object().cloned())
            .collect(),
        Some(Value::Null) => Vec::new(),
        None => {
            return QueryOutcome::Failed {
                error: format!("unrecognized run_sql payload: {}", payload),
            }
        }
        Some(other) => {
            return QueryOutcome::Failed {
                error: format!("unexpected result payload: {}", other),
            }
        }
    };
    let columns = rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    QueryOutcome::Rows { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_content_preferred() {
        let payload = tool_payload(
            Some(json!({"databases": ["orders"]})),
            &["{\"databases\": [\"ignored\"]}".to_string()],
        );
        assert_eq!(catalog_list(&payload).unwrap().names, vec!["orders"]);
    }

    #[test]
    fn test_text_content_fallback() {
        let payload = tool_payload(None, &["{\"schema\": [\"CREATE TABLE t (a TEXT)\"]}".into()]);
        let schema = schema_info("support", &payload).unwrap();
        assert_eq!(schema.statements, vec!["CREATE TABLE t (a TEXT)"]);
    }

    #[test]
    fn test_wrapped_object_unwrapped() {
        let payload = tool_payload(Some(json!({"result": {"databases": ["a", "b"]}})), &[]);
        assert_eq!(catalog_list(&payload).unwrap().names.len(), 2);
    }

    #[test]
    fn test_unparseable_payload_is_a_failure() {
        let payload = tool_payload(None, &["not json".into()]);
        assert!(payload.is_null());
        assert!(matches!(
            catalog_list(&payload),
            Err(SupportError::ToolExecution { ref message, .. }) if message.contains("unrecognized")
        ));
        assert!(matches!(
            schema_info("orders", &payload),
            Err(SupportError::ToolExecution { .. })
        ));
        match query_outcome(&payload) {
            QueryOutcome::Failed { error } => {
                assert!(error.starts_with("unrecognized run_sql payload"))
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_payload_without_known_keys_is_a_failure() {
        let payload = tool_payload(None, &["{\"rows\": [{\"id\": 1}]}".into()]);
        assert!(query_outcome(&payload).is_failed());
        assert!(catalog_list(&json!({"dbs": ["orders"]})).is_err());
        // An empty list is still a valid answer
        assert!(catalog_list(&json!({"databases": []})).unwrap().names.is_empty());
        assert_eq!(query_outcome(&json!({"result": []})).row_count(), 0);
    }

    #[test]
    fn test_query_rows() {
        let payload = json!({"result": [{"Order ID": "1", "Status": "shipped"}, {"Order ID": "2", "Status": "late"}]});
        match query_outcome(&payload) {
            QueryOutcome::Rows { columns, rows } => {
                assert_eq!(columns, vec!["Order ID", "Status"]);
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[1]["Status"], "late");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_query_error_is_data() {
        let payload = json!({"error": "no such table: orders"});
        assert_eq!(
            query_outcome(&payload),
            QueryOutcome::Failed {
                error: "no such table: orders".into()
            }
        );
        // A null error field is not a failure
        let payload = json!({"result": [], "error": null});
        assert!(!query_outcome(&payload).is_failed());
    }

    #[test]
    fn test_schema_error_is_not_found() {
        let err = schema_info("ghost", &json!({"error": "unable to open database"})).unwrap_err();
        assert!(matches!(err, SupportError::NotFound(ref m) if m.contains("ghost")));
    }

    #[test]
    fn test_list_error_is_tool_failure() {
        assert!(catalog_list(&json!({"error": "permission denied"})).is_err());
    }
}
