use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

use supportdesk_core::error::{Result, SupportError};
use supportdesk_core::sql_policy::{SqlPolicy, Verdict};
use supportdesk_core::traits::{CatalogGateway, Tool};
use supportdesk_core::types::{QueryOutcome, ToolContext, ToolResult};

fn parse_input<T: DeserializeOwned>(input: serde_json::Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| SupportError::ToolValidation(e.to_string()))
}

fn json_result(value: serde_json::Value) -> ToolResult {
    ToolResult::success(value.to_string())
}

#[derive(Deserialize)]
struct DbInput {
    db_name: String,
}

#[derive(Deserialize)]
struct QueryInput {
    db_name: String,
    query: String,
}

fn query_schema(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "db_name": { "type": "string", "description": "Database name from list_databases" },
            "query": { "type": "string", "description": description }
        },
        "required": ["db_name", "query"]
    })
}

// ── ListDatabasesTool ───────────────────────────────────────────

pub struct ListDatabasesTool {
    gateway: Arc<dyn CatalogGateway>,
    timeout_secs: u64,
}

impl ListDatabasesTool {
    pub fn new(gateway: Arc<dyn CatalogGateway>, timeout_secs: u64) -> Self {
        Self {
            gateway,
            timeout_secs,
        }
    }
}

impl Tool for ListDatabasesTool {
    fn name(&self) -> &str {
        "list_databases"
    }
    fn description(&self) -> &str {
        "List available SQLite databases."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let list = self.gateway.list_catalogs().await?;
            Ok(json_result(serde_json::json!({ "databases": list.names })))
        })
    }
}

// ── GetSchemaTool ───────────────────────────────────────────────

pub struct GetSchemaTool {
    gateway: Arc<dyn CatalogGateway>,
    timeout_secs: u64,
}

impl GetSchemaTool {
    pub fn new(gateway: Arc<dyn CatalogGateway>, timeout_secs: u64) -> Self {
        Self {
            gateway,
            timeout_secs,
        }
    }
}

impl Tool for GetSchemaTool {
    fn name(&self) -> &str {
        "get_schema"
    }
    fn description(&self) -> &str {
        "Fetch the CREATE TABLE statements of a database."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "db_name": { "type": "string", "description": "Database name from list_databases" }
            },
            "required": ["db_name"]
        })
    }
    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: DbInput = parse_input(input)?;
            let schema = self.gateway.get_schema(&p.db_name).await?;
            Ok(json_result(serde_json::json!({ "schema": schema.statements })))
        })
    }
}

// ── ValidateSqlTool ─────────────────────────────────────────────

/// Deterministic policy check; a rejection is a successful tool result.
pub struct ValidateSqlTool {
    gateway: Arc<dyn CatalogGateway>,
    policy: SqlPolicy,
    timeout_secs: u64,
}

impl ValidateSqlTool {
    pub fn new(gateway: Arc<dyn CatalogGateway>, policy: SqlPolicy, timeout_secs: u64) -> Self {
        Self {
            gateway,
            policy,
            timeout_secs,
        }
    }
}

impl Tool for ValidateSqlTool {
    fn name(&self) -> &str {
        "validate_sql"
    }
    fn description(&self) -> &str {
        "Check a SQL query against the read-only policy and the database schema. \
         Returns the approved (normalized) SQL or the rejection reason."
    }
    fn input_schema(&self) -> serde_json::Value {
        query_schema("SQL query to validate")
    }
    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: QueryInput = parse_input(input)?;
            let schema = self.gateway.get_schema(&p.db_name).await?;
            let verdict = self.policy.validate(&p.query, &schema.snippet());
            info!(run_id = %ctx.run_id, db = %p.db_name, approved = verdict.is_approved(), "SQL validated");
            Ok(json_result(serde_json::to_value(&verdict)?))
        })
    }
}

// ── RunSqlTool ──────────────────────────────────────────────────

/// Executes a query after re-applying the policy; only the normalized SQL runs.
pub struct RunSqlTool {
    gateway: Arc<dyn CatalogGateway>,
    policy: SqlPolicy,
    timeout_secs: u64,
}

impl RunSqlTool {
    pub fn new(gateway: Arc<dyn CatalogGateway>, policy: SqlPolicy, timeout_secs: u64) -> Self {
        Self {
            gateway,
            policy,
            timeout_secs,
        }
    }
}

impl Tool for RunSqlTool {
    fn name(&self) -> &str {
        "run_sql"
    }
    fn description(&self) -> &str {
        "Execute a read-only SQL query on a database and return the rows."
    }
    fn input_schema(&self) -> serde_json::Value {
        query_schema("Validated SELECT query")
    }
    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: QueryInput = parse_input(input)?;
            let schema = self.gateway.get_schema(&p.db_name).await?;
            let sql = match self.policy.validate(&p.query, &schema.snippet()) {
                Verdict::Approved { sql } => sql,
                Verdict::Rejected { reason } => {
                    warn!(run_id = %ctx.run_id, db = %p.db_name, %reason, "Refused to run query");
                    return Ok(ToolResult::error(
                        serde_json::json!({ "error": format!("query rejected: {}", reason) })
                            .to_string(),
                    ));
                }
            };

            match self.gateway.run_query(&p.db_name, &sql).await? {
                QueryOutcome::Rows { columns, rows } => Ok(json_result(serde_json::json!({
                    "sql": sql,
                    "columns": columns,
                    "result": rows,
                }))),
                QueryOutcome::Failed { error } => Ok(ToolResult::error(
                    serde_json::json!({ "sql": sql, "error": error }).to_string(),
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use supportdesk_core::types::RunId;

    fn ctx() -> ToolContext {
        ToolContext {
            run_id: RunId::new(),
            agent: "sql_executor".into(),
        }
    }

    fn fixture() -> (tempfile::TempDir, Arc<dyn CatalogGateway>) {
        let dir = tempfile::tempdir().unwrap();
        let conn = rusqlite::Connection::open(dir.path().join("support.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE tickets ('ticket_id' TEXT, 'status' TEXT);
             INSERT INTO tickets VALUES ('T1', 'open');
             INSERT INTO tickets VALUES ('T2', 'closed');",
        )
        .unwrap();
        let gateway: Arc<dyn CatalogGateway> = Arc::new(SqliteCatalog::new(dir.path()));
        (dir, gateway)
    }

    fn parse(result: &ToolResult) -> serde_json::Value {
        serde_json::from_str(&result.content).unwrap()
    }

    #[tokio::test]
    async fn test_list_and_schema() {
        let (_dir, gateway) = fixture();
        let list = ListDatabasesTool::new(gateway.clone(), 30)
            .execute(serde_json::json!({}), ctx())
            .await
            .unwrap();
        assert_eq!(parse(&list)["databases"][0], "support");

        let schema = GetSchemaTool::new(gateway, 30)
            .execute(serde_json::json!({ "db_name": "support" }), ctx())
            .await
            .unwrap();
        assert!(parse(&schema)["schema"][0]
            .as_str()
            .unwrap()
            .contains("tickets"));
    }

    #[tokio::test]
    async fn test_schema_missing_argument() {
        let (_dir, gateway) = fixture();
        let err = GetSchemaTool::new(gateway, 30)
            .execute(serde_json::json!({}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, SupportError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn test_validate_reports_verdict() {
        let (_dir, gateway) = fixture();
        let tool = ValidateSqlTool::new(gateway, SqlPolicy::default(), 30);

        let ok = tool
            .execute(
                serde_json::json!({ "db_name": "support", "query": "SELECT * FROM tickets" }),
                ctx(),
            )
            .await
            .unwrap();
        assert!(!ok.is_error);
        let v = parse(&ok);
        assert_eq!(v["status"], "approved");
        assert_eq!(v["sql"], "SELECT * FROM tickets LIMIT 50");

        let rejected = tool
            .execute(
                serde_json::json!({ "db_name": "support", "query": "DROP TABLE tickets" }),
                ctx(),
            )
            .await
            .unwrap();
        assert_eq!(parse(&rejected)["status"], "rejected");
    }

    #[tokio::test]
    async fn test_run_sql_applies_policy() {
        let (_dir, gateway) = fixture();
        let tool = RunSqlTool::new(gateway, SqlPolicy::new(1, 50), 30);

        let result = tool
            .execute(
                serde_json::json!({ "db_name": "support", "query": "SELECT * FROM tickets ORDER BY ticket_id" }),
                ctx(),
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        let v = parse(&result);
        assert_eq!(v["sql"], "SELECT * FROM tickets ORDER BY ticket_id LIMIT 1");
        assert_eq!(v["result"].as_array().unwrap().len(), 1);
        assert_eq!(v["result"][0]["ticket_id"], "T1");
    }

    #[tokio::test]
    async fn test_run_sql_refuses_writes() {
        let (_dir, gateway) = fixture();
        let tool = RunSqlTool::new(gateway, SqlPolicy::default(), 30);
        let result = tool
            .execute(
                serde_json::json!({ "db_name": "support", "query": "DELETE FROM tickets" }),
                ctx(),
            )
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(parse(&result)["error"]
            .as_str()
            .unwrap()
            .starts_with("query rejected"));
    }

    #[tokio::test]
    async fn test_run_sql_unknown_database() {
        let (_dir, gateway) = fixture();
        let err = RunSqlTool::new(gateway, SqlPolicy::default(), 30)
            .execute(
                serde_json::json!({ "db_name": "nope", "query": "SELECT 1" }),
                ctx(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SupportError::NotFound(_)));
    }
}
