use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use rmcp::model::{CallToolRequestParams, RawContent};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};

use supportdesk_core::config::{CatalogConfig, McpTransport};
use supportdesk_core::error::{Result, SupportError};
use supportdesk_core::traits::CatalogGateway;
use supportdesk_core::types::{CatalogList, QueryOutcome, SchemaInfo};

use crate::handler::CatalogClientHandler;
use crate::payload;

type Session = RunningService<RoleClient, CatalogClientHandler>;

/// `CatalogGateway` backed by an MCP server exposing `list_databases`,
/// `get_schema` and `run_sql`.
///
/// Every call opens its own session and closes it before returning.
pub struct McpCatalogGateway {
    transport: McpTransport,
    timeout: Duration,
}

impl McpCatalogGateway {
    pub fn new(transport: McpTransport, timeout_secs: u64) -> Self {
        Self {
            transport,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Build from the `[catalog]` section. Fails when no transport is configured.
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let transport = config.mcp_transport().ok_or_else(|| {
            SupportError::Configuration(
                "catalog backend 'mcp' needs `mcp_url` or `[catalog.transport]`".into(),
            )
        })?;
        Ok(Self::new(transport, config.timeout_secs))
    }

    /// Human-readable server address for logs.
    pub fn endpoint(&self) -> String {
        match &self.transport {
            McpTransport::Stdio { command, .. } => format!("stdio:{}", command),
            McpTransport::Http { url } => url.clone(),
        }
    }

    async fn connect(&self) -> Result<Session> {
        let endpoint = self.endpoint();
        let handler = CatalogClientHandler::new(endpoint.clone());

        let connecting = async {
            match &self.transport {
                McpTransport::Stdio { command, args, env } => {
                    let mut cmd = tokio::process::Command::new(command);
                    cmd.args(args);
                    for (k, v) in env {
                        cmd.env(k, v);
                    }
                    let transport = rmcp::transport::TokioChildProcess::new(cmd).map_err(|e| {
                        SupportError::GatewayUnavailable(format!("failed to spawn {}: {}", command, e))
                    })?;
                    handler.serve(transport).await.map_err(|e| {
                        SupportError::GatewayUnavailable(format!("{}: {}", endpoint, e))
                    })
                }
                McpTransport::Http { url } => {
                    let transport = StreamableHttpClientTransport::from_uri(url.as_str());
                    <CatalogClientHandler as ServiceExt<RoleClient>>::serve(handler, transport)
                        .await
                        .map_err(|e| SupportError::GatewayUnavailable(format!("{}: {}", url, e)))
                }
            }
        };

        match tokio::time::timeout(self.timeout, connecting).await {
            Ok(session) => session,
            Err(_) => Err(SupportError::GatewayUnavailable(format!(
                "{}: connection timed out after {}s",
                self.endpoint(),
                self.timeout.as_secs()
            ))),
        }
    }

    /// Call one tool in a fresh session and return its normalized payload.
    async fn call(&self, tool: &str, arguments: Map<String, Value>) -> Result<Value> {
        let mut session = self.connect().await?;
        let params = CallToolRequestParams {
            name: tool.to_string().into(),
            arguments: Some(arguments),
            meta: None,
            task: None,
        };

        let outcome = tokio::time::timeout(self.timeout, session.call_tool(params)).await;
        if let Err(e) = session.close().await {
            warn!(endpoint = %self.endpoint(), error = %e, "Failed to close catalog session");
        }

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return Err(SupportError::GatewayUnavailable(format!(
                    "tool call '{}' failed: {}",
                    tool, e
                )))
            }
            Err(_) => {
                return Err(SupportError::GatewayUnavailable(format!(
                    "tool call '{}' timed out after {}s",
                    tool,
                    self.timeout.as_secs()
                )))
            }
        };

        let texts: Vec<String> = result
            .content
            .iter()
            .filter_map(|c| match c.raw {
                RawContent::Text(ref t) => Some(t.text.to_string()),
                _ => None,
            })
            .collect();
        debug!(tool, blocks = texts.len(), "Catalog tool returned");

        // Tool-level failures are reported as data, in the shape the server uses.
        if result.is_error == Some(true) {
            return Ok(json!({ "error": texts.join("\n") }));
        }
        Ok(payload::tool_payload(result.structured_content, &texts))
    }
}

fn args(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

impl CatalogGateway for McpCatalogGateway {
    fn list_catalogs(&self) -> BoxFuture<'_, Result<CatalogList>> {
        Box::pin(async move {
            let payload = self.call("list_databases", Map::new()).await?;
            payload::catalog_list(&payload)
        })
    }

    fn get_schema<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<SchemaInfo>> {
        Box::pin(async move {
            let payload = self.call("get_schema", args(&[("db_name", name)])).await?;
            let schema = payload::schema_info(name, &payload)?;
            // Servers that open databases lazily report an empty schema for unknown names
            if schema.statements.is_empty() {
                let known = self.list_catalogs().await?;
                if !known.names.iter().any(|n| n == name) {
                    return Err(SupportError::NotFound(format!("database '{}'", name)));
                }
            }
            Ok(schema)
        })
    }

    fn run_query<'a>(&'a self, name: &'a str, sql: &'a str) -> BoxFuture<'a, Result<QueryOutcome>> {
        Box::pin(async move {
            let payload = self
                .call("run_sql", args(&[("db_name", name), ("query", sql)]))
                .await?;
            Ok(payload::query_outcome(&payload))
        })
    }
}
