use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// LLM client: one chat completion per call.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and wait for the complete response.
    fn complete(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<ModelResponse>>;
}

/// Something an agent can call during its turn.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in model tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Read-only data-access gateway behind the catalog tools.
///
/// Implementations must return query execution failures as
/// `QueryOutcome::Failed` and reserve `Err` for unknown catalogs
/// (`NotFound`) and transport problems (`GatewayUnavailable`).
pub trait CatalogGateway: Send + Sync + 'static {
    /// Names of every available catalog.
    fn list_catalogs(&self) -> BoxFuture<'_, Result<CatalogList>>;

    /// CREATE statements of one catalog.
    fn get_schema<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<SchemaInfo>>;

    /// Run a query against one catalog.
    fn run_query<'a>(&'a self, name: &'a str, sql: &'a str) -> BoxFuture<'a, Result<QueryOutcome>>;
}
