mod doctor;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use supportdesk_agent::{LlmDecider, WorkflowFactory};
use supportdesk_core::config::{AppConfig, CatalogBackend};
use supportdesk_core::event::EventBus;
use supportdesk_core::traits::{CatalogGateway, LlmClient};
use supportdesk_core::types::WorkflowEvent;
use supportdesk_mcp::McpCatalogGateway;
use supportdesk_tools::{SqliteCatalog, ToolRegistry};

#[derive(Parser)]
#[command(name = "supportdesk", version, about = "Customer-support agent handoff orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "supportdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the bind address from the config
        #[arg(long)]
        bind: Option<String>,
    },
    /// Answer one question and exit
    Ask {
        /// The customer question
        #[arg(trailing_var_arg = true, required = true)]
        question: Vec<String>,
        /// Print every agent turn after the answer
        #[arg(long)]
        trace: bool,
    },
    /// Show current configuration
    Config,
    /// List databases and their schema statements
    Catalogs,
    /// Load a CSV file into a SQLite database in the catalog directory
    ImportCsv {
        /// CSV file to import
        #[arg(long)]
        csv: PathBuf,
        /// Database name (file `<name>.db`)
        #[arg(long)]
        db: String,
        /// Table to (re)create
        #[arg(long)]
        table: String,
    },
    /// Run configuration health checks
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("supportdesk=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "supportdesk", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve { bind } => {
            let mut server_config = config.server.clone();
            if let Some(bind) = bind {
                server_config.bind = bind;
            }
            let events = Arc::new(EventBus::default());
            let factory = build_factory(&config, events)?;
            // Fail at startup rather than on the first request
            factory.build()?;

            let server = supportdesk_gateway::GatewayServer::new(server_config, factory);
            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Ask { question, trace } => {
            let question = question.join(" ");
            if question.trim().is_empty() {
                anyhow::bail!("Question cannot be empty");
            }
            run_once(&config, question.trim(), trace).await?;
        }
        Commands::Config => {
            let mut shown = config.clone();
            if shown.model.api_key.is_some() {
                shown.model.api_key = Some("********".into());
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
        Commands::Catalogs => {
            let gateway = build_catalog(&config)?;
            let list = gateway.list_catalogs().await?;
            if list.names.is_empty() {
                println!("No databases found.");
            }
            for name in &list.names {
                println!("{}", name);
                match gateway.get_schema(name).await {
                    Ok(schema) => {
                        for statement in &schema.statements {
                            println!("  {}", statement.replace('\n', "\n  "));
                        }
                    }
                    Err(e) => println!("  (schema unavailable: {})", e),
                }
            }
        }
        Commands::ImportCsv { csv, db, table } => {
            let dir = config.catalog_dir();
            let report = tokio::task::spawn_blocking(move || {
                supportdesk_tools::import_csv(&csv, &dir, &db, &table)
            })
            .await??;
            println!(
                "Imported {} rows into {} ({}): {}",
                report.rows,
                report.db_path.display(),
                report.table,
                report.columns.join(", ")
            );
        }
        Commands::Doctor => {
            doctor::run_doctor(&config).await;
        }
        // Handled before config loading
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// `--config` if it exists, then `~/.supportdesk/config.toml`, then the environment.
fn load_config(path: &PathBuf) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(home_config) = dirs_home().map(|h| h.join(".supportdesk").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }
    warn!("No config file found, building config from environment");
    Ok(AppConfig::from_env()?)
}

pub(crate) fn build_catalog(config: &AppConfig) -> anyhow::Result<Arc<dyn CatalogGateway>> {
    Ok(match config.catalog.backend {
        CatalogBackend::Sqlite => Arc::new(SqliteCatalog::new(config.catalog_dir())),
        CatalogBackend::Mcp => Arc::new(McpCatalogGateway::from_config(&config.catalog)?),
    })
}

pub(crate) fn build_factory(
    config: &AppConfig,
    events: Arc<EventBus>,
) -> anyhow::Result<WorkflowFactory> {
    let catalog = build_catalog(config)?;
    let tools = ToolRegistry::with_catalog_tools(
        catalog,
        config.workflow.sql_policy(),
        config.catalog.timeout_secs,
    );
    let llm: Arc<dyn LlmClient> = Arc::from(supportdesk_llm::create_client(&config.model));
    let decider = LlmDecider::new(llm, config.model.clone());

    Ok(WorkflowFactory::new(
        Arc::new(decider),
        Arc::new(tools),
        events,
        config.workflow.clone(),
    ))
}

async fn run_once(config: &AppConfig, question: &str, show_trace: bool) -> anyhow::Result<()> {
    let events = Arc::new(EventBus::default());
    let factory = build_factory(config, events.clone())?;
    let orchestrator = factory.build()?;

    // Subscribe to events for progress output
    let mut rx = events.subscribe();
    let print_handle = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                WorkflowEvent::TurnStarted { step, agent, .. } => {
                    eprintln!("[{}] {}", step, agent);
                }
                WorkflowEvent::ToolEnd { name, result, .. } => {
                    let status = if result.is_error { "ERROR" } else { "ok" };
                    eprintln!("    [{}: {}] {}", name, status, truncate(&result.content, 200));
                }
                WorkflowEvent::Handoff { from, to, .. } => {
                    eprintln!("    {} -> {}", from, to);
                }
                WorkflowEvent::RunComplete { .. } | WorkflowEvent::RunFailed { .. } => break,
                _ => {}
            }
        }
    });

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        cancel.cancel();
    });

    let result = orchestrator.run(question).await;
    print_handle.await.ok();

    if show_trace {
        for turn in result.turns() {
            eprintln!("--- step {} ({}) ---", turn.step, turn.agent);
            for inv in &turn.tool_invocations {
                eprintln!("  {}({}) -> {}", inv.call.name, inv.call.input, truncate(&inv.result.content, 500));
            }
            if !turn.text.is_empty() {
                eprintln!("{}", turn.text);
            }
        }
    }

    match result.into_outcome() {
        Ok(answer) => {
            println!("{}", answer);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
