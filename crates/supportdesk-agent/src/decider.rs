use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use supportdesk_core::config::ModelConfig;
use supportdesk_core::error::Result;
use supportdesk_core::traits::LlmClient;
use supportdesk_core::types::*;

use crate::agent::AgentSpec;
use crate::context::{ConversationContext, Directive, ToolInvocation};

/// Prefix of the synthetic tools that express a handoff to a real model.
pub const HANDOFF_TOOL_PREFIX: &str = "handoff_to_";

/// What an agent wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Terminal answer; ends the run.
    Final(String),
    /// Transfer control. `message` is what the agent hands over.
    Handoff { target: String, message: String },
    /// Run these tools and ask the same agent again.
    ToolCalls(Vec<ToolCall>),
}

impl Action {
    pub fn handoff(target: impl Into<String>) -> Self {
        Self::Handoff {
            target: target.into(),
            message: String::new(),
        }
    }

    pub fn handoff_with(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handoff {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn final_answer(text: impl Into<String>) -> Self {
        Self::Final(text.into())
    }

    /// A single tool call.
    pub fn tool(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self::ToolCalls(vec![ToolCall::new(name, input)])
    }
}

/// Everything an agent can see when deciding.
pub struct DecisionRequest<'a> {
    pub run_id: &'a RunId,
    pub step: usize,
    pub agent: &'a AgentSpec,
    pub context: &'a ConversationContext,
    /// Tool calls already made in the current turn, with results.
    pub pending: &'a [ToolInvocation],
    /// Definitions of the agent's own tools.
    pub tools: &'a [ToolDefinition],
}

/// The model-calling capability: (instructions, conversation, tools) -> action.
pub trait Decider: Send + Sync + 'static {
    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> BoxFuture<'a, Result<Action>>;
}

/// Decider backed by a chat-completion model.
///
/// Handoff targets are offered as extra tools named `handoff_to_<agent>`.
pub struct LlmDecider {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl LlmDecider {
    pub fn new(llm: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { llm, config }
    }
}

fn handoff_tools(agent: &AgentSpec) -> Vec<ToolDefinition> {
    agent
        .handoffs
        .iter()
        .map(|target| ToolDefinition {
            name: format!("{}{}", HANDOFF_TOOL_PREFIX, target),
            description: format!(
                "Transfer control to the {} agent. Put everything it needs in `message`.",
                target
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "Output handed to the next agent" }
                },
                "required": ["message"]
            }),
        })
        .collect()
}

fn system_prompt(agent: &AgentSpec) -> String {
    let mut prompt = agent.instructions.trim().to_string();
    if agent.handoffs.is_empty() {
        prompt.push_str("\n\nYou are the last agent. Answer the customer directly.");
    } else {
        let names: Vec<String> = agent
            .handoffs
            .iter()
            .map(|t| format!("{}{}", HANDOFF_TOOL_PREFIX, t))
            .collect();
        prompt.push_str(&format!(
            "\n\nWhen your part is done, call exactly one of: {}.",
            names.join(", ")
        ));
        if !agent.requires_handoff {
            prompt.push_str(" You may instead answer the customer directly.");
        }
    }
    prompt
}

/// Render the run so far as chat messages. Tool calls of the current turn
/// keep their native tool-use structure.
fn build_messages(request: &DecisionRequest<'_>) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::system(system_prompt(request.agent)),
        ChatMessage::user(format!("Customer question: {}", request.context.question())),
    ];

    for turn in request.context.turns() {
        let mut text = format!("[{}]", turn.agent);
        for inv in &turn.tool_invocations {
            text.push_str(&format!(
                "\n- {}({}) -> {}",
                inv.call.name, inv.call.input, inv.result.content
            ));
        }
        if !turn.text.is_empty() {
            text.push('\n');
            text.push_str(&turn.text);
        }
        if let Directive::Handoff { target } = &turn.directive {
            text.push_str(&format!("\n(handed off to {})", target));
        }
        messages.push(ChatMessage::user(text));
    }

    for inv in request.pending {
        messages.push(ChatMessage {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: inv.call.id.clone(),
                name: inv.call.name.clone(),
                input: inv.call.input.clone(),
            }],
        });
        messages.push(ChatMessage {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: inv.call.id.clone(),
                content: inv.result.content.clone(),
                is_error: inv.result.is_error,
            }],
        });
    }
    messages
}

/// Map a model response onto an action. Real tool calls win over handoffs.
fn to_action(agent: &AgentSpec, response: ModelResponse) -> Action {
    let (handoffs, calls): (Vec<ToolCall>, Vec<ToolCall>) = response
        .tool_calls
        .into_iter()
        .partition(|c| c.name.starts_with(HANDOFF_TOOL_PREFIX));

    if !calls.is_empty() {
        return Action::ToolCalls(calls);
    }
    if let Some(call) = handoffs.into_iter().next() {
        let message = call
            .input
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or(response.text);
        return Action::Handoff {
            target: call.name[HANDOFF_TOOL_PREFIX.len()..].to_string(),
            message,
        };
    }
    // A must-hand-off agent with a single way out answered in prose
    if agent.requires_handoff && agent.handoffs.len() == 1 {
        debug!(agent = %agent.name, target = %agent.handoffs[0], "Implicit handoff");
        return Action::handoff_with(agent.handoffs[0].clone(), response.text);
    }
    Action::Final(response.text)
}

impl Decider for LlmDecider {
    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> BoxFuture<'a, Result<Action>> {
        Box::pin(async move {
            let messages = build_messages(&request);
            let mut tools = request.tools.to_vec();
            tools.extend(handoff_tools(request.agent));

            let response = self.llm.complete(&self.config, messages, &tools).await?;
            debug!(
                run_id = %request.run_id,
                agent = %request.agent.name,
                step = request.step,
                tool_calls = response.tool_calls.len(),
                "Model decided"
            );
            Ok(to_action(request.agent, response))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn response(text: &str, calls: Vec<ToolCall>) -> ModelResponse {
        ModelResponse {
            text: text.into(),
            stop_reason: if calls.is_empty() {
                StopReason::EndTurn
            } else {
                StopReason::ToolUse
            },
            tool_calls: calls,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Returns one canned response and records what it was sent.
    struct Canned {
        response: ModelResponse,
        seen_tools: Mutex<Vec<String>>,
        seen_messages: Mutex<Vec<ChatMessage>>,
    }

    impl LlmClient for Canned {
        fn complete(
            &self,
            _config: &ModelConfig,
            messages: Vec<ChatMessage>,
            tools: &[ToolDefinition],
        ) -> BoxFuture<'_, Result<ModelResponse>> {
            *self.seen_tools.lock().unwrap() = tools.iter().map(|t| t.name.clone()).collect();
            *self.seen_messages.lock().unwrap() = messages;
            let response = self.response.clone();
            Box::pin(async move { Ok(response) })
        }
    }

    fn canned(response: ModelResponse) -> Arc<Canned> {
        Arc::new(Canned {
            response,
            seen_tools: Mutex::new(vec![]),
            seen_messages: Mutex::new(vec![]),
        })
    }

    fn selector() -> AgentSpec {
        AgentSpec::new("database_selector", "pick a database")
            .with_tools(["list_databases"])
            .with_handoffs(["sql_generator"])
            .requiring_handoff()
    }

    async fn decide(llm: Arc<Canned>, agent: &AgentSpec, pending: &[ToolInvocation]) -> Action {
        let config: ModelConfig = toml::from_str("model_id = \"test\"").unwrap();
        let decider = LlmDecider::new(llm, config);
        let run_id = RunId::new();
        let context = ConversationContext::new("show me open tickets");
        let tools = vec![ToolDefinition {
            name: "list_databases".into(),
            description: "list".into(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        decider
            .decide(DecisionRequest {
                run_id: &run_id,
                step: 2,
                agent,
                context: &context,
                pending,
                tools: &tools,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_handoff_tools_offered() {
        let llm = canned(response("done", vec![]));
        let agent = selector();
        decide(llm.clone(), &agent, &[]).await;
        let tools = llm.seen_tools.lock().unwrap().clone();
        assert_eq!(tools, vec!["list_databases", "handoff_to_sql_generator"]);
        let messages = llm.seen_messages.lock().unwrap();
        assert!(messages[0].text().contains("handoff_to_sql_generator"));
        assert!(messages[1].text().contains("show me open tickets"));
    }

    #[tokio::test]
    async fn test_handoff_call_becomes_handoff() {
        let call = ToolCall::new(
            "handoff_to_sql_generator",
            serde_json::json!({"message": "{\"selected_db\": \"support\"}"}),
        );
        let action = decide(canned(response("", vec![call])), &selector(), &[]).await;
        assert_eq!(
            action,
            Action::handoff_with("sql_generator", "{\"selected_db\": \"support\"}")
        );
    }

    #[tokio::test]
    async fn test_real_tool_calls_take_precedence() {
        let calls = vec![
            ToolCall::new("handoff_to_sql_generator", serde_json::json!({})),
            ToolCall::new("list_databases", serde_json::json!({})),
        ];
        let action = decide(canned(response("", calls)), &selector(), &[]).await;
        match action {
            Action::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "list_databases");
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_undeclared_handoff_is_passed_through() {
        let call = ToolCall::new("handoff_to_sql_executor", serde_json::json!({"message": "x"}));
        let action = decide(canned(response("", vec![call])), &selector(), &[]).await;
        assert_eq!(action, Action::handoff_with("sql_executor", "x"));
    }

    #[tokio::test]
    async fn test_implicit_handoff_for_single_target() {
        let action = decide(canned(response("{\"selected_db\": \"support\"}", vec![])), &selector(), &[]).await;
        assert_eq!(
            action,
            Action::handoff_with("sql_generator", "{\"selected_db\": \"support\"}")
        );
    }

    #[tokio::test]
    async fn test_terminal_agent_text_is_final() {
        let agent = AgentSpec::new("final_response", "answer");
        let action = decide(canned(response("Found 2 records", vec![])), &agent, &[]).await;
        assert_eq!(action, Action::final_answer("Found 2 records"));
    }

    #[tokio::test]
    async fn test_pending_tool_results_are_replayed() {
        let llm = canned(response("ok", vec![]));
        let call = ToolCall::new("list_databases", serde_json::json!({}));
        let pending = vec![ToolInvocation {
            call: call.clone(),
            result: ToolResult::success("{\"databases\":[\"support\"]}"),
        }];
        decide(llm.clone(), &AgentSpec::new("final_response", ""), &pending).await;
        let messages = llm.seen_messages.lock().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].tool_uses()[0].0, call.id);
        assert!(matches!(
            &messages[3].content[0],
            ContentBlock::ToolResult { tool_use_id, .. } if *tool_use_id == call.id
        ));
    }
}
