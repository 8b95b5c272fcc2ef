use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a model conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// A chat message sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Extract all text content from this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract all tool use blocks from this message.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// A structured tool call requested by the model or by a scripted decider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            input,
        }
    }
}

/// One complete (non-streamed) model response.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool definition for sending to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub run_id: RunId,
    pub agent: String,
}

// ── Tool gateway payloads ───────────────────────────────────────

/// Names of the datasets reachable through the tool gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogList {
    pub names: Vec<String>,
}

/// Schema statements (CREATE TABLE ...) of one dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub statements: Vec<String>,
}

impl SchemaInfo {
    /// All statements joined into one snippet.
    pub fn snippet(&self) -> String {
        self.statements.join(";\n")
    }
}

/// Outcome of running a query. Execution errors are data, not `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<serde_json::Map<String, serde_json::Value>>,
    },
    Failed {
        error: String,
    },
}

impl QueryOutcome {
    pub fn row_count(&self) -> usize {
        match self {
            Self::Rows { rows, .. } => rows.len(),
            Self::Failed { .. } => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

// ── Workflow events ─────────────────────────────────────────────

/// Event broadcast to all subscribers while workflows run.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// A run started at the coordinator.
    RunStarted { run_id: RunId, question: String },
    /// An agent became active for a step.
    TurnStarted { run_id: RunId, step: usize, agent: String },
    /// Tool execution started.
    ToolStart { run_id: RunId, agent: String, name: String, input: serde_json::Value },
    /// Tool execution completed.
    ToolEnd { run_id: RunId, agent: String, name: String, result: ToolResult },
    /// Control passed along a declared edge.
    Handoff { run_id: RunId, from: String, to: String },
    /// A terminal turn was produced.
    RunComplete { run_id: RunId, steps: usize, agent: String, at: DateTime<Utc> },
    /// The run failed.
    RunFailed { run_id: RunId, kind: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_ids_are_unique() {
        let a = ToolCall::new("run_sql", serde_json::json!({}));
        let b = ToolCall::new("run_sql", serde_json::json!({}));
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));
    }

    #[test]
    fn test_schema_snippet_joins_statements() {
        let schema = SchemaInfo {
            statements: vec![
                "CREATE TABLE a (x TEXT)".into(),
                "CREATE TABLE b (y TEXT)".into(),
            ],
        };
        assert_eq!(
            schema.snippet(),
            "CREATE TABLE a (x TEXT);\nCREATE TABLE b (y TEXT)"
        );
    }

    #[test]
    fn test_query_outcome_serializes_with_status_tag() {
        let outcome = QueryOutcome::Failed {
            error: "no such table: x".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "no such table: x");
        assert_eq!(outcome.row_count(), 0);
    }

    #[test]
    fn test_message_text_and_tool_uses() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: vec![
                ContentBlock::Text { text: "checking".into() },
                ContentBlock::ToolUse {
                    id: "1".into(),
                    name: "list_databases".into(),
                    input: serde_json::json!({}),
                },
            ],
        };
        assert_eq!(msg.text(), "checking");
        assert_eq!(msg.tool_uses().len(), 1);
        assert_eq!(msg.tool_uses()[0].1, "list_databases");
    }
}
