use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupportError {
    // Workflow errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Protocol violation: agent '{from}' attempted undeclared handoff to '{to}'")]
    ProtocolViolation { from: String, to: String },

    #[error("Budget exceeded: {scope} limit of {limit} reached without a terminal turn")]
    BudgetExceeded { limit: usize, scope: String },

    #[error("Run cancelled")]
    Cancelled,

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Gateway errors
    #[error("Tool gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Caller errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Config file errors
    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SupportError {
    /// Whether the failure was caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) | Self::ConfigNotFound(_) => "configuration",
            Self::ProtocolViolation { .. } => "protocol_violation",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Cancelled => "cancelled",
            Self::ToolNotFound(_)
            | Self::ToolExecution { .. }
            | Self::ToolTimeout { .. }
            | Self::ToolValidation(_) => "tool",
            Self::GatewayUnavailable(_) => "gateway_unavailable",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::LlmRequest(_) | Self::LlmParse(_) => "model",
            Self::Database(_) => "database",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, SupportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(SupportError::InvalidInput("empty".into()).is_client_error());
        assert!(!SupportError::Cancelled.is_client_error());
        assert!(!SupportError::ProtocolViolation {
            from: "a".into(),
            to: "b".into()
        }
        .is_client_error());
    }

    #[test]
    fn test_protocol_violation_message_names_both_agents() {
        let err = SupportError::ProtocolViolation {
            from: "sql_generator".into(),
            to: "sql_executor".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sql_generator"));
        assert!(msg.contains("sql_executor"));
        assert_eq!(err.kind(), "protocol_violation");
    }

    #[test]
    fn test_budget_message() {
        let err = SupportError::BudgetExceeded {
            limit: 20,
            scope: "step".into(),
        };
        assert_eq!(
            err.to_string(),
            "Budget exceeded: step limit of 20 reached without a terminal turn"
        );
    }
}
