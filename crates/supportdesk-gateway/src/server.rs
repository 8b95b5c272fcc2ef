use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use supportdesk_agent::WorkflowFactory;
use supportdesk_core::config::ServerConfig;

use crate::routes;
use crate::state::AppState;

/// HTTP gateway in front of the support workflow, built on axum.
pub struct GatewayServer {
    config: ServerConfig,
    factory: WorkflowFactory,
}

impl GatewayServer {
    pub fn new(config: ServerConfig, factory: WorkflowFactory) -> Self {
        Self { config, factory }
    }

    /// The application router. Runs started through it are cancelled with `shutdown`.
    pub fn router(&self, shutdown: CancellationToken) -> Router {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            factory: self.factory.clone(),
            shutdown,
        });

        let app = Router::new()
            .route("/", get(routes::root))
            .route("/health", get(routes::health))
            .route("/query", post(routes::query));

        let app = if self.config.cors {
            app.layer(CorsLayer::permissive())
        } else {
            app
        };
        app.with_state(state)
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = self.router(shutdown.clone());

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}
