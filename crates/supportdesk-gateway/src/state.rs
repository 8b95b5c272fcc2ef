use tokio_util::sync::CancellationToken;

use supportdesk_agent::WorkflowFactory;
use supportdesk_core::config::ServerConfig;

/// Shared application state for axum handlers.
///
/// Holds only the factory; every request builds its own orchestrator.
pub struct AppState {
    pub config: ServerConfig,
    pub factory: WorkflowFactory,
    /// Cancelled when the server shuts down; per-run tokens are its children.
    pub shutdown: CancellationToken,
}
