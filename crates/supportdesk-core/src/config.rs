use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SupportError};
use crate::sql_policy::SqlPolicy;

/// Top-level supportdesk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Limits and policy knobs of the handoff workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Maximum number of agent turns in one run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Maximum tool-call rounds inside a single turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Upper bound for any LIMIT clause the executor runs.
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
    /// LIMIT appended to queries that have none.
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    /// Gateway-unavailable tool failures tolerated per run before the run fails.
    #[serde(default = "default_gateway_retry_limit")]
    pub gateway_retry_limit: usize,
    /// Directory for JSONL run traces. Traces are not written when unset.
    #[serde(default)]
    pub trace_dir: Option<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_tool_rounds: default_max_tool_rounds(),
            max_limit: default_max_limit(),
            default_limit: default_limit(),
            gateway_retry_limit: default_gateway_retry_limit(),
            trace_dir: None,
        }
    }
}

impl WorkflowConfig {
    /// The query safety policy for these limits.
    pub fn sql_policy(&self) -> SqlPolicy {
        SqlPolicy::new(self.max_limit, self.default_limit)
    }
}

fn default_max_steps() -> usize { 20 }
fn default_max_tool_rounds() -> usize { 6 }
fn default_max_limit() -> u64 { 1000 }
fn default_limit() -> u64 { 50 }
fn default_gateway_retry_limit() -> usize { 2 }

/// Which tool gateway backs the catalog tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogBackend {
    /// SQLite files in a local directory.
    #[default]
    Sqlite,
    /// A remote MCP tool server.
    Mcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub backend: CatalogBackend,
    /// Directory holding `<name>.db` files (sqlite backend).
    #[serde(default = "default_catalog_dir")]
    pub dir: String,
    /// Shorthand for an HTTP transport (mcp backend).
    #[serde(default)]
    pub mcp_url: Option<String>,
    /// Transport of the MCP tool server (mcp backend).
    #[serde(default)]
    pub transport: Option<McpTransport>,
    /// Per-call timeout in seconds.
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            backend: CatalogBackend::default(),
            dir: default_catalog_dir(),
            mcp_url: None,
            transport: None,
            timeout_secs: default_catalog_timeout(),
        }
    }
}

impl CatalogConfig {
    /// The MCP transport, preferring an explicit `[catalog.transport]` over `mcp_url`.
    pub fn mcp_transport(&self) -> Option<McpTransport> {
        self.transport.clone().or_else(|| {
            self.mcp_url
                .as_ref()
                .map(|url| McpTransport::Http { url: url.clone() })
        })
    }
}

fn default_catalog_dir() -> String { "./databases".to_string() }
fn default_catalog_timeout() -> u64 { 30 }

/// MCP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    #[serde(alias = "sse")]
    Http {
        url: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Runs still going after this many seconds are cancelled.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout(),
            cors: true,
        }
    }
}

fn default_bind() -> String { "0.0.0.0:8000".to_string() }
fn default_request_timeout() -> u64 { 120 }
fn default_true() -> bool { true }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SupportError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| SupportError::Configuration(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Build a minimal config from environment variables.
    ///
    /// Reads `SUPPORTDESK_MODEL`, `SUPPORTDESK_BASE_URL`, `SUPPORTDESK_DB_DIR`
    /// and an API key from `SUPPORTDESK_API_KEY`, `GOOGLE_API_KEY` or
    /// `OPENAI_API_KEY` (first one set wins).
    pub fn from_env() -> Result<Self> {
        let api_key = ["SUPPORTDESK_API_KEY", "GOOGLE_API_KEY", "OPENAI_API_KEY"]
            .iter()
            .find_map(|k| std::env::var(k).ok());
        let uses_google = api_key.is_some()
            && std::env::var("SUPPORTDESK_API_KEY").is_err()
            && std::env::var("GOOGLE_API_KEY").is_ok();

        let base_url = std::env::var("SUPPORTDESK_BASE_URL").ok().or_else(|| {
            uses_google.then(|| {
                "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                    .to_string()
            })
        });
        let model_id = std::env::var("SUPPORTDESK_MODEL").unwrap_or_else(|_| {
            if uses_google {
                "gemini-2.5-flash".to_string()
            } else {
                "gpt-4o-mini".to_string()
            }
        });

        let mut catalog = CatalogConfig::default();
        if let Ok(dir) = std::env::var("SUPPORTDESK_DB_DIR") {
            catalog.dir = dir;
        }

        let config = Self {
            model: ModelConfig {
                provider: default_provider(),
                model_id,
                api_key,
                base_url,
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                extra_headers: HashMap::new(),
                retry: Some(RetryConfig::default()),
            },
            workflow: WorkflowConfig::default(),
            catalog,
            server: ServerConfig::default(),
        };
        config.check()?;
        Ok(config)
    }

    /// Resolve the catalog directory (expand ~).
    pub fn catalog_dir(&self) -> PathBuf {
        let dir = &self.catalog.dir;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }

    /// Reject values that would make the workflow unusable.
    fn check(&self) -> Result<()> {
        if self.workflow.max_steps == 0 {
            return Err(SupportError::Configuration(
                "workflow.max_steps must be at least 1".into(),
            ));
        }
        if self.workflow.max_tool_rounds == 0 {
            return Err(SupportError::Configuration(
                "workflow.max_tool_rounds must be at least 1".into(),
            ));
        }
        if self.catalog.backend == CatalogBackend::Mcp && self.catalog.mcp_transport().is_none() {
            return Err(SupportError::Configuration(
                "catalog.backend = \"mcp\" requires mcp_url or [catalog.transport]".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables stay as written
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_SUPPORTDESK_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_SUPPORTDESK_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_SUPPORTDESK_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_SUPPORTDESK_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_SUPPORTDESK_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let toml_str = r#"
[model]
model_id = "gemini-2.5-flash"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.workflow.max_steps, 20);
        assert_eq!(config.workflow.max_tool_rounds, 6);
        assert_eq!(config.workflow.max_limit, 1000);
        assert_eq!(config.workflow.default_limit, 50);
        assert_eq!(config.workflow.gateway_retry_limit, 2);
        assert!(config.workflow.trace_dir.is_none());
        assert_eq!(config.catalog.backend, CatalogBackend::Sqlite);
        assert_eq!(config.server.bind, "0.0.0.0:8000");
    }

    #[test]
    fn test_mcp_transport_accepts_sse_alias() {
        let toml_str = r#"
[model]
model_id = "m"

[catalog]
backend = "mcp"

[catalog.transport]
type = "sse"
url = "http://localhost:8001/mcp/"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.check().is_ok());
        assert!(matches!(
            config.catalog.transport,
            Some(McpTransport::Http { ref url }) if url == "http://localhost:8001/mcp/"
        ));
    }

    #[test]
    fn test_mcp_url_shorthand() {
        let toml_str = r#"
[model]
model_id = "m"

[catalog]
backend = "mcp"
mcp_url = "http://127.0.0.1:8001/mcp/"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.check().is_ok());
        assert!(matches!(
            config.catalog.mcp_transport(),
            Some(McpTransport::Http { .. })
        ));
        assert!(config.server.cors);
    }

    #[test]
    fn test_mcp_backend_without_transport_is_rejected() {
        let toml_str = r#"
[model]
model_id = "m"

[catalog]
backend = "mcp"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(config.check(), Err(SupportError::Configuration(_))));
    }

    #[test]
    fn test_zero_steps_rejected() {
        let toml_str = r#"
[model]
model_id = "m"

[workflow]
max_steps = 0
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.check().is_err());
    }

    #[test]
    fn test_sql_policy_from_workflow_config() {
        let wf = WorkflowConfig {
            max_limit: 200,
            default_limit: 20,
            ..Default::default()
        };
        let policy = wf.sql_policy();
        assert_eq!(policy.max_limit, 200);
        assert_eq!(policy.default_limit, 20);
    }
}
