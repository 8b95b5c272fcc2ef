pub mod agent;
pub mod context;
pub mod decider;
pub mod graph;
pub mod json;
pub mod orchestrator;
pub mod run_log;
pub mod workflow;

pub use agent::AgentSpec;
pub use context::{ConversationContext, Directive, ToolInvocation, Turn};
pub use decider::{Action, Decider, DecisionRequest, LlmDecider, HANDOFF_TOOL_PREFIX};
pub use graph::{HandoffGraph, Participant};
pub use json::{clean_output, extract_json, strip_code_fences};
pub use orchestrator::{Orchestrator, RunResult};
pub use run_log::TraceWriter;
pub use workflow::{customer_support_agents, Workflow, WorkflowFactory};
