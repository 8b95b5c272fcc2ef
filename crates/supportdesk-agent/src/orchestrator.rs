use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use supportdesk_core::config::WorkflowConfig;
use supportdesk_core::error::{Result, SupportError};
use supportdesk_core::event::EventBus;
use supportdesk_core::types::{RunId, ToolCall, ToolContext, ToolResult, WorkflowEvent};
use supportdesk_tools::ToolRegistry;

use crate::agent::AgentSpec;
use crate::context::{ConversationContext, Directive, ToolInvocation, Turn};
use crate::decider::{Action, Decider, DecisionRequest};
use crate::json::clean_output;
use crate::run_log::TraceWriter;
use crate::workflow::Workflow;

/// Label used as the handoff target when a must-hand-off agent answers directly.
const FINAL_TARGET: &str = "(final answer)";

/// The outcome of one run plus its full trace.
#[derive(Debug)]
pub struct RunResult {
    pub run_id: RunId,
    pub question: String,
    pub turns: Vec<Turn>,
    /// Number of recorded turns.
    pub steps: usize,
    pub elapsed_ms: u64,
    pub outcome: std::result::Result<String, SupportError>,
}

impl RunResult {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The terminal answer, if the run succeeded.
    pub fn final_output(&self) -> Option<&str> {
        self.outcome.as_ref().ok().map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Acting agents in step order.
    pub fn agent_path(&self) -> Vec<&str> {
        self.turns.iter().map(|t| t.agent.as_str()).collect()
    }

    pub fn into_outcome(self) -> std::result::Result<String, SupportError> {
        self.outcome
    }
}

/// Per-run mutable state. Created by `run` and never shared.
struct RunState {
    run_id: RunId,
    active: String,
    step: usize,
    terminal: bool,
    final_output: Option<String>,
    gateway_failures: usize,
}

impl RunState {
    fn new(coordinator: &str) -> Self {
        Self {
            run_id: RunId::new(),
            active: coordinator.to_string(),
            step: 0,
            terminal: false,
            final_output: None,
            gateway_failures: 0,
        }
    }
}

/// How a turn ended once its tool calls were resolved.
enum TurnEnd {
    Final(String),
    Handoff { target: String, message: String },
}

/// Drives one workflow from the coordinator to a terminal turn.
///
/// Each step asks the active agent's decider for an action, resolves tool
/// calls through the registry, records the turn, then either follows a
/// declared handoff or stops on a final answer.
pub struct Orchestrator {
    workflow: Workflow,
    decider: Arc<dyn Decider>,
    tools: Arc<ToolRegistry>,
    events: Arc<EventBus>,
    config: WorkflowConfig,
    cancel: CancellationToken,
    trace: Option<TraceWriter>,
}

impl Orchestrator {
    pub fn new(
        workflow: Workflow,
        decider: Arc<dyn Decider>,
        tools: Arc<ToolRegistry>,
        events: Arc<EventBus>,
        config: WorkflowConfig,
    ) -> Self {
        let trace = config.trace_dir.as_deref().map(TraceWriter::new);
        Self {
            workflow,
            decider,
            tools,
            events,
            config,
            cancel: CancellationToken::new(),
            trace,
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_trace_writer(mut self, writer: TraceWriter) -> Self {
        self.trace = Some(writer);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Run the workflow for one question.
    pub async fn run(&self, question: &str) -> RunResult {
        let started = Instant::now();
        let mut state = RunState::new(self.workflow.graph().coordinator());
        let mut context = ConversationContext::new(question);

        info!(run_id = %state.run_id, coordinator = %state.active, "Run started");
        self.events.publish(WorkflowEvent::RunStarted {
            run_id: state.run_id.clone(),
            question: question.to_string(),
        });

        let outcome = self.drive(&mut state, &mut context).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => info!(
                run_id = %state.run_id,
                steps = context.turns().len(),
                elapsed_ms,
                "Run complete"
            ),
            Err(e) => {
                warn!(run_id = %state.run_id, kind = e.kind(), error = %e, "Run failed");
                self.events.publish(WorkflowEvent::RunFailed {
                    run_id: state.run_id.clone(),
                    kind: e.kind().to_string(),
                    error: e.to_string(),
                });
            }
        }

        let turns = context.into_turns();
        let result = RunResult {
            run_id: state.run_id,
            question: question.to_string(),
            steps: turns.len(),
            turns,
            elapsed_ms,
            outcome,
        };

        if let Some(writer) = &self.trace {
            if let Err(e) = writer.write(&result).await {
                warn!(run_id = %result.run_id, error = %e, "Failed to write run trace");
            }
        }
        result
    }

    async fn drive(
        &self,
        state: &mut RunState,
        context: &mut ConversationContext,
    ) -> Result<String> {
        while !state.terminal {
            if self.cancel.is_cancelled() {
                return Err(SupportError::Cancelled);
            }
            state.step += 1;
            if state.step > self.config.max_steps {
                return Err(SupportError::BudgetExceeded {
                    limit: self.config.max_steps,
                    scope: "step".into(),
                });
            }

            let agent = self.workflow.agent(&state.active).ok_or_else(|| {
                SupportError::Configuration(format!("unknown agent '{}'", state.active))
            })?;

            debug!(run_id = %state.run_id, step = state.step, agent = %agent.name, "Starting turn");
            self.events.publish(WorkflowEvent::TurnStarted {
                run_id: state.run_id.clone(),
                step: state.step,
                agent: agent.name.clone(),
            });

            let (end, invocations) = self.take_turn(state, context, agent).await?;

            match end {
                TurnEnd::Final(text) => {
                    let text = clean_output(&text);
                    context.push(Turn {
                        step: state.step,
                        agent: agent.name.clone(),
                        text: text.clone(),
                        directive: Directive::Final,
                        tool_invocations: invocations,
                        at: Utc::now(),
                    });
                    if agent.requires_handoff {
                        return Err(self.violation(state, &agent.name, FINAL_TARGET));
                    }
                    self.events.publish(WorkflowEvent::RunComplete {
                        run_id: state.run_id.clone(),
                        steps: state.step,
                        agent: agent.name.clone(),
                        at: Utc::now(),
                    });
                    state.final_output = Some(text);
                    state.terminal = true;
                }
                TurnEnd::Handoff { target, message } => {
                    context.push(Turn {
                        step: state.step,
                        agent: agent.name.clone(),
                        text: message,
                        directive: Directive::Handoff {
                            target: target.clone(),
                        },
                        tool_invocations: invocations,
                        at: Utc::now(),
                    });
                    if !self.workflow.graph().allows(&agent.name, &target) {
                        return Err(self.violation(state, &agent.name, &target));
                    }
                    info!(
                        run_id = %state.run_id,
                        step = state.step,
                        from = %agent.name,
                        to = %target,
                        "Handoff"
                    );
                    self.events.publish(WorkflowEvent::Handoff {
                        run_id: state.run_id.clone(),
                        from: agent.name.clone(),
                        to: target.clone(),
                    });
                    state.active = target;
                }
            }
        }

        state
            .final_output
            .take()
            .ok_or_else(|| SupportError::Configuration("run ended without output".into()))
    }

    /// Ask the decider until it stops requesting tools.
    async fn take_turn(
        &self,
        state: &mut RunState,
        context: &ConversationContext,
        agent: &AgentSpec,
    ) -> Result<(TurnEnd, Vec<ToolInvocation>)> {
        let definitions = self.tools.definitions_for(&agent.tools);
        let mut invocations: Vec<ToolInvocation> = Vec::new();
        let mut rounds = 0usize;

        loop {
            let action = self
                .decider
                .decide(DecisionRequest {
                    run_id: &state.run_id,
                    step: state.step,
                    agent,
                    context,
                    pending: &invocations,
                    tools: &definitions,
                })
                .await?;

            match action {
                Action::Final(text) => return Ok((TurnEnd::Final(text), invocations)),
                Action::Handoff { target, message } => {
                    return Ok((TurnEnd::Handoff { target, message }, invocations))
                }
                Action::ToolCalls(calls) => {
                    rounds += 1;
                    if rounds > self.config.max_tool_rounds {
                        return Err(SupportError::BudgetExceeded {
                            limit: self.config.max_tool_rounds,
                            scope: format!("tool rounds for agent '{}'", agent.name),
                        });
                    }
                    for call in calls {
                        let result = self.invoke(state, agent, &call).await?;
                        invocations.push(ToolInvocation { call, result });
                    }
                }
            }
        }
    }

    /// Execute one tool call. Tool failures become error results; only
    /// repeated gateway outages fail the run.
    async fn invoke(
        &self,
        state: &mut RunState,
        agent: &AgentSpec,
        call: &ToolCall,
    ) -> Result<ToolResult> {
        if !agent.has_tool(&call.name) {
            warn!(run_id = %state.run_id, agent = %agent.name, tool = %call.name, "Tool not available to agent");
            return Ok(ToolResult::error(format!(
                "tool '{}' is not available to agent '{}'",
                call.name, agent.name
            )));
        }

        self.events.publish(WorkflowEvent::ToolStart {
            run_id: state.run_id.clone(),
            agent: agent.name.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        });

        let ctx = ToolContext {
            run_id: state.run_id.clone(),
            agent: agent.name.clone(),
        };
        let result = match self.tools.execute(&call.name, call.input.clone(), ctx).await {
            Ok(result) => result,
            Err(SupportError::GatewayUnavailable(msg)) => {
                state.gateway_failures += 1;
                warn!(
                    run_id = %state.run_id,
                    tool = %call.name,
                    failures = state.gateway_failures,
                    error = %msg,
                    "Tool gateway unavailable"
                );
                if state.gateway_failures > self.config.gateway_retry_limit {
                    return Err(SupportError::GatewayUnavailable(msg));
                }
                ToolResult::error(format!("tool gateway unavailable: {}", msg))
            }
            Err(e) => {
                warn!(run_id = %state.run_id, tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(e.to_string())
            }
        };

        self.events.publish(WorkflowEvent::ToolEnd {
            run_id: state.run_id.clone(),
            agent: agent.name.clone(),
            name: call.name.clone(),
            result: result.clone(),
        });
        Ok(result)
    }

    fn violation(&self, state: &RunState, from: &str, to: &str) -> SupportError {
        let err = SupportError::ProtocolViolation {
            from: from.to_string(),
            to: to.to_string(),
        };
        error!(
            run_id = %state.run_id,
            step = state.step,
            kind = err.kind(),
            from,
            to,
            "Undeclared handoff"
        );
        err
    }
}
