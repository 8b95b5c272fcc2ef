use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use futures::future::BoxFuture;

use supportdesk_agent::{Action, Decider, DecisionRequest};
use supportdesk_core::error::{Result, SupportError};

type Responder = Box<dyn Fn(&DecisionRequest<'_>) -> Action + Send + Sync>;

/// Decider that replays fixed actions per agent.
///
/// Each agent has a queue of actions consumed in order. When the queue is
/// empty the agent's responder (if any) is used; otherwise the decision
/// fails with `LlmRequest`, which makes a wrong route visible in tests.
#[derive(Default)]
pub struct ScriptedDecider {
    queues: Mutex<HashMap<String, VecDeque<Action>>>,
    responders: HashMap<String, Responder>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedDecider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue actions for `agent`.
    pub fn on<I>(self, agent: &str, actions: I) -> Self
    where
        I: IntoIterator<Item = Action>,
    {
        if let Ok(mut queues) = self.queues.lock() {
            queues.entry(agent.to_string()).or_default().extend(actions);
        }
        self
    }

    /// Return `action` every time `agent` runs out of queued actions.
    pub fn repeat(self, agent: &str, action: Action) -> Self {
        self.respond_with(agent, move |_| action.clone())
    }

    /// Compute the action from the request once `agent`'s queue is empty.
    pub fn respond_with<F>(mut self, agent: &str, f: F) -> Self
    where
        F: Fn(&DecisionRequest<'_>) -> Action + Send + Sync + 'static,
    {
        self.responders.insert(agent.to_string(), Box::new(f));
        self
    }

    /// Agent names in the order they were asked to decide.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Decider for ScriptedDecider {
    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> BoxFuture<'a, Result<Action>> {
        let agent = request.agent.name.clone();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(agent.clone());
        }

        let queued = self
            .queues
            .lock()
            .ok()
            .and_then(|mut q| q.get_mut(&agent).and_then(VecDeque::pop_front));
        let action = match queued {
            Some(action) => Ok(action),
            None => match self.responders.get(&agent) {
                Some(respond) => Ok(respond(&request)),
                None => Err(SupportError::LlmRequest(format!(
                    "no scripted action left for agent '{}'",
                    agent
                ))),
            },
        };
        Box::pin(async move { action })
    }
}
