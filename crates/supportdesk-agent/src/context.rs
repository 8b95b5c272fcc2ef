use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supportdesk_core::types::{ToolCall, ToolResult};

use crate::json::extract_json;

/// How a turn handed control on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    Handoff { target: String },
    Final,
}

/// One tool call made during a turn, with its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call: ToolCall,
    pub result: ToolResult,
}

/// A completed agent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based step number within the run.
    pub step: usize,
    pub agent: String,
    /// Text the agent emitted (handoff message or final answer).
    pub text: String,
    pub directive: Directive,
    pub tool_invocations: Vec<ToolInvocation>,
    pub at: DateTime<Utc>,
}

impl Turn {
    /// The JSON object the agent emitted, if its text contains one.
    pub fn payload(&self) -> Option<serde_json::Value> {
        extract_json(&self.text)
    }
}

/// The question plus the append-only turn log of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    question: String,
    turns: Vec<Turn>,
}

impl ConversationContext {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            turns: Vec::new(),
        }
    }

    /// Append a finished turn. Earlier turns are never modified.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(step: usize, agent: &str, text: &str) -> Turn {
        Turn {
            step,
            agent: agent.into(),
            text: text.into(),
            directive: Directive::Final,
            tool_invocations: vec![],
            at: Utc::now(),
        }
    }

    #[test]
    fn test_push_preserves_order() {
        let mut ctx = ConversationContext::new("where is my order?");
        ctx.push(turn(1, "triage", "routing"));
        ctx.push(turn(2, "final_response", "shipped"));
        assert_eq!(ctx.question(), "where is my order?");
        let agents: Vec<_> = ctx.turns().iter().map(|t| t.agent.as_str()).collect();
        assert_eq!(agents, vec!["triage", "final_response"]);
        assert_eq!(ctx.last().unwrap().step, 2);
    }

    #[test]
    fn test_payload_from_fenced_text() {
        let t = turn(1, "sql_generator", "```json\n{\"query\": \"SELECT 1\"}\n```");
        assert_eq!(t.payload().unwrap()["query"], "SELECT 1");
        assert!(turn(1, "x", "plain words").payload().is_none());
    }

    #[test]
    fn test_directive_serialization() {
        let json = serde_json::to_value(Directive::Handoff {
            target: "sql_validator".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "handoff");
        assert_eq!(json["target"], "sql_validator");
    }
}
