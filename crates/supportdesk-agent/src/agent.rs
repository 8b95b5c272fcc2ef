use serde::{Deserialize, Serialize};

/// Declarative description of one agent in a workflow.
///
/// Tools are names resolved against the `ToolRegistry` when the workflow is
/// built. An agent with no handoffs is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Unique name within a workflow.
    pub name: String,
    /// Fixed instructions (system prompt).
    pub instructions: String,
    /// Tool names this agent may call, in presentation order.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Agents this one may hand off to.
    #[serde(default)]
    pub handoffs: Vec<String>,
    /// Whether every turn of this agent must end in a handoff.
    #[serde(default)]
    pub requires_handoff: bool,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            tools: vec![],
            handoffs: vec![],
            requires_handoff: false,
        }
    }

    /// Set the tool names.
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Set the allowed handoff targets.
    pub fn with_handoffs<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handoffs = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Mark this agent as never producing a final answer itself.
    pub fn requiring_handoff(mut self) -> Self {
        self.requires_handoff = true;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.handoffs.is_empty()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t == name)
    }
}
