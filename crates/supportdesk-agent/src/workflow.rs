use std::collections::HashSet;
use std::sync::Arc;

use supportdesk_core::config::WorkflowConfig;
use supportdesk_core::error::{Result, SupportError};
use supportdesk_core::event::EventBus;
use supportdesk_tools::ToolRegistry;

use crate::agent::AgentSpec;
use crate::decider::Decider;
use crate::graph::{HandoffGraph, Participant};
use crate::orchestrator::Orchestrator;

pub const TRIAGE: &str = "triage";
pub const DATABASE_SELECTOR: &str = "database_selector";
pub const SQL_GENERATOR: &str = "sql_generator";
pub const SQL_VALIDATOR: &str = "sql_validator";
pub const SQL_EXECUTOR: &str = "sql_executor";
pub const FRAUD_DETECTION: &str = "fraud_detection";
pub const FINAL_RESPONSE: &str = "final_response";

const TRIAGE_INSTRUCTIONS: &str = r#"
You are the customer support triage agent. Read the customer's question and route it.
- Questions about orders, shipments or support tickets need data: hand off to database_selector.
- Questions mentioning fraud, scams or suspicious activity: hand off to fraud_detection.
- Billing, payment and general or complex questions: hand off to final_response.
Never answer the customer yourself. In your handoff message, restate what the customer needs.
"#;

const DATABASE_SELECTOR_INSTRUCTIONS: &str = r#"
You are a database selection agent.
1. Call list_databases to see the available databases.
2. Call get_schema for each candidate database.
3. Match keywords from the question against table and column names and pick the best database.
Hand off a JSON object only, with no code fences:
{"selected_db": "database_name", "schema": "CREATE TABLE statements...", "reasoning": "why this database"}
"#;

const SQL_GENERATOR_INSTRUCTIONS: &str = r#"
You convert a natural-language question into one read-only SQLite query.
- Use SELECT only, with table and column names exactly as in the schema.
- Add LIMIT 50 when the question does not ask for a specific number of rows.
- If a validator or executor reported a problem with an earlier query, fix that problem.
Hand off a JSON object only, with no code fences or commentary:
{"selected_db": "database_name", "query": "SELECT ... LIMIT 50"}
"#;

const SQL_VALIDATOR_INSTRUCTIONS: &str = r#"
You are the SQL validation agent. Call validate_sql with the selected database and the candidate query.
- If the verdict is approved, hand off to sql_executor with
  {"status": "approved", "selected_db": "database_name", "approved_sql": "<normalized SQL from the verdict>"}
- If the verdict is rejected, hand off to sql_generator with
  {"status": "rejected", "reason": "<reason from the verdict>"}
Always use the SQL returned by validate_sql, never the original text.
"#;

const SQL_EXECUTOR_INSTRUCTIONS: &str = r#"
You are the SQL execution agent. Call run_sql with the selected database and the approved SQL.
- On success hand off to final_response with
  {"database_used": "...", "sql_executed": "...", "num_rows": 0, "results": [], "status": "success"}
- If the query failed because it was wrong, hand off to sql_generator with the error so it can be fixed.
- Any other failure: hand off to final_response with "status": "error" and the error text.
"#;

const FRAUD_DETECTION_INSTRUCTIONS: &str = r#"
You are the fraud detection agent. The customer reported possible fraud, a scam or unusual activity.
Explain the immediate protective steps (freeze the card or account, change passwords, review recent
transactions) and that a specialist will open an investigation. Do not ask for passwords or full card numbers.
Either answer the customer directly or hand off your findings to final_response.
"#;

const FINAL_RESPONSE_INSTRUCTIONS: &str = r#"
You are the final agent. Turn the previous agent's output into a clear answer for the customer.
- Report only data that was actually returned. Never invent names, values or columns.
- If the status is error, report the error only.
- If no rows were returned, say "No matching records were found."
- If there are results, summarize them and include "Found X records matching your query".
- For billing or general questions without data, answer helpfully and briefly.
Return plain text with no JSON and no code fences.
Example: {"sql_executed": "SELECT count(*) ...", "num_rows": 1, "results": [{"count(*)": 27}], "status": "success"}
becomes "The total number of orders placed by female customers is 27."
"#;

/// The customer-support agents and their handoff edges.
pub fn customer_support_agents() -> Vec<AgentSpec> {
    vec![
        AgentSpec::new(TRIAGE, TRIAGE_INSTRUCTIONS)
            .with_handoffs([DATABASE_SELECTOR, FRAUD_DETECTION, FINAL_RESPONSE])
            .requiring_handoff(),
        AgentSpec::new(DATABASE_SELECTOR, DATABASE_SELECTOR_INSTRUCTIONS)
            .with_tools(["list_databases", "get_schema"])
            .with_handoffs([SQL_GENERATOR])
            .requiring_handoff(),
        AgentSpec::new(SQL_GENERATOR, SQL_GENERATOR_INSTRUCTIONS)
            .with_handoffs([SQL_VALIDATOR])
            .requiring_handoff(),
        AgentSpec::new(SQL_VALIDATOR, SQL_VALIDATOR_INSTRUCTIONS)
            .with_tools(["validate_sql"])
            .with_handoffs([SQL_EXECUTOR, SQL_GENERATOR])
            .requiring_handoff(),
        AgentSpec::new(SQL_EXECUTOR, SQL_EXECUTOR_INSTRUCTIONS)
            .with_tools(["run_sql"])
            .with_handoffs([SQL_GENERATOR, FINAL_RESPONSE]),
        AgentSpec::new(FRAUD_DETECTION, FRAUD_DETECTION_INSTRUCTIONS)
            .with_handoffs([FINAL_RESPONSE]),
        AgentSpec::new(FINAL_RESPONSE, FINAL_RESPONSE_INSTRUCTIONS),
    ]
}

/// A validated set of agents plus the handoff graph derived from them.
#[derive(Debug, Clone)]
pub struct Workflow {
    graph: HandoffGraph,
    agents: Vec<AgentSpec>,
}

impl Workflow {
    /// Build and validate a workflow. Tool names are checked against `tools`.
    pub fn new(
        coordinator: impl Into<String>,
        agents: Vec<AgentSpec>,
        tools: &ToolRegistry,
    ) -> Result<Self> {
        let mut names = HashSet::new();
        for agent in &agents {
            if !names.insert(agent.name.as_str()) {
                return Err(SupportError::Configuration(format!(
                    "agent '{}' is defined twice",
                    agent.name
                )));
            }
            if let Some(missing) = agent.tools.iter().find(|t| !tools.contains(t)) {
                return Err(SupportError::Configuration(format!(
                    "agent '{}' references unknown tool '{}'",
                    agent.name, missing
                )));
            }
        }

        let mut graph = HandoffGraph::declare(
            coordinator,
            agents
                .iter()
                .map(|a| Participant::new(a.name.clone(), a.requires_handoff)),
        );
        for agent in agents.iter().filter(|a| !a.handoffs.is_empty()) {
            graph.add_edge(agent.name.clone(), agent.handoffs.iter().cloned());
        }
        graph.validate()?;

        Ok(Self { graph, agents })
    }

    pub fn graph(&self) -> &HandoffGraph {
        &self.graph
    }

    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn agents(&self) -> &[AgentSpec] {
        &self.agents
    }
}

/// Builds a fresh `Workflow` and `Orchestrator` for every run.
///
/// Only stateless handles are shared between the orchestrators it builds.
#[derive(Clone)]
pub struct WorkflowFactory {
    decider: Arc<dyn Decider>,
    tools: Arc<ToolRegistry>,
    events: Arc<EventBus>,
    config: WorkflowConfig,
    coordinator: String,
    agents: Vec<AgentSpec>,
}

impl WorkflowFactory {
    /// Factory for the customer-support workflow.
    pub fn new(
        decider: Arc<dyn Decider>,
        tools: Arc<ToolRegistry>,
        events: Arc<EventBus>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            decider,
            tools,
            events,
            config,
            coordinator: TRIAGE.to_string(),
            agents: customer_support_agents(),
        }
    }

    /// Replace the agent blueprint.
    pub fn with_agents(mut self, coordinator: impl Into<String>, agents: Vec<AgentSpec>) -> Self {
        self.coordinator = coordinator.into();
        self.agents = agents;
        self
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Build a new orchestrator with its own workflow instance.
    pub fn build(&self) -> Result<Orchestrator> {
        let workflow = Workflow::new(self.coordinator.clone(), self.agents.clone(), &self.tools)?;
        Ok(Orchestrator::new(
            workflow,
            self.decider.clone(),
            self.tools.clone(),
            self.events.clone(),
            self.config.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use supportdesk_core::types::{CatalogList, QueryOutcome, SchemaInfo};
    use supportdesk_core::traits::CatalogGateway;

    use crate::decider::{Action, DecisionRequest};

    struct NoCatalog;

    impl CatalogGateway for NoCatalog {
        fn list_catalogs(&self) -> BoxFuture<'_, Result<CatalogList>> {
            Box::pin(async { Ok(CatalogList { names: vec![] }) })
        }
        fn get_schema<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<SchemaInfo>> {
            Box::pin(async move { Err(SupportError::NotFound(name.to_string())) })
        }
        fn run_query<'a>(&'a self, _name: &'a str, _sql: &'a str) -> BoxFuture<'a, Result<QueryOutcome>> {
            Box::pin(async { Ok(QueryOutcome::Failed { error: "no catalogs".into() }) })
        }
    }

    struct Never;

    impl Decider for Never {
        fn decide<'a>(&'a self, _request: DecisionRequest<'a>) -> BoxFuture<'a, Result<Action>> {
            Box::pin(async { Ok(Action::final_answer("n/a")) })
        }
    }

    fn catalog_tools() -> ToolRegistry {
        ToolRegistry::with_catalog_tools(Arc::new(NoCatalog), Default::default(), 30)
    }

    #[test]
    fn test_customer_support_graph() {
        let workflow = Workflow::new(TRIAGE, customer_support_agents(), &catalog_tools()).unwrap();
        let graph = workflow.graph();
        assert_eq!(graph.coordinator(), TRIAGE);
        assert!(graph.allows(TRIAGE, DATABASE_SELECTOR));
        assert!(graph.allows(TRIAGE, FRAUD_DETECTION));
        assert!(graph.allows(SQL_VALIDATOR, SQL_GENERATOR));
        assert!(graph.allows(SQL_EXECUTOR, FINAL_RESPONSE));
        assert!(!graph.allows(TRIAGE, SQL_EXECUTOR));
        assert!(!graph.allows(FRAUD_DETECTION, DATABASE_SELECTOR));
        assert!(graph.is_terminal(FINAL_RESPONSE));
        assert!(workflow.agent(SQL_EXECUTOR).unwrap().has_tool("run_sql"));
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let agents = vec![AgentSpec::new("a", "").with_tools(["shell"])];
        let err = Workflow::new("a", agents, &catalog_tools()).unwrap_err();
        assert!(err.to_string().contains("unknown tool 'shell'"));
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let agents = vec![AgentSpec::new("a", ""), AgentSpec::new("a", "")];
        assert!(Workflow::new("a", agents, &catalog_tools()).is_err());
    }

    #[test]
    fn test_unknown_handoff_target_rejected() {
        let agents = vec![AgentSpec::new("a", "").with_handoffs(["b"])];
        let err = Workflow::new("a", agents, &catalog_tools()).unwrap_err();
        assert!(matches!(err, SupportError::Configuration(_)));
    }

    #[test]
    fn test_factory_builds_independent_orchestrators() {
        let factory = WorkflowFactory::new(
            Arc::new(Never),
            Arc::new(catalog_tools()),
            Arc::new(EventBus::default()),
            WorkflowConfig::default(),
        );
        let a = factory.build().unwrap();
        let b = factory.build().unwrap();
        a.cancellation_token().cancel();
        assert!(!b.cancellation_token().is_cancelled());
        assert_eq!(a.workflow().agents().len(), 7);
    }
}
