use std::collections::HashMap;
use std::sync::Arc;

use supportdesk_core::error::{Result, SupportError};
use supportdesk_core::sql_policy::SqlPolicy;
use supportdesk_core::traits::{CatalogGateway, Tool};
use supportdesk_core::types::{ToolContext, ToolDefinition, ToolResult};

use crate::builtin::catalog::{GetSchemaTool, ListDatabasesTool, RunSqlTool, ValidateSqlTool};

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all registered tools, sorted by name.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Tool definitions for the given names, in the given order. Unknown names are skipped.
    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| SupportError::ToolNotFound(name.to_string()))?;

        let timeout = std::time::Duration::from_secs(tool.timeout_secs());

        match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(SupportError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }

    /// Create a registry with the four catalog tools bound to one gateway.
    pub fn with_catalog_tools(
        gateway: Arc<dyn CatalogGateway>,
        policy: SqlPolicy,
        timeout_secs: u64,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(ListDatabasesTool::new(gateway.clone(), timeout_secs));
        registry.register(GetSchemaTool::new(gateway.clone(), timeout_secs));
        registry.register(ValidateSqlTool::new(gateway.clone(), policy, timeout_secs));
        registry.register(RunSqlTool::new(gateway, policy, timeout_secs));
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
