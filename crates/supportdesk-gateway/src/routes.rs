use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use supportdesk_core::error::SupportError;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: String,
    pub response: String,
}

impl QueryResponse {
    fn success(response: String) -> Self {
        Self {
            status: "success".into(),
            response,
        }
    }

    fn error(response: String) -> Self {
        Self {
            status: "error".into(),
            response,
        }
    }
}

/// Error response carrying the same body shape as a successful answer.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<SupportError> for ApiError {
    fn from(e: SupportError) -> Self {
        let status = if e.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(QueryResponse::error(self.message))).into_response()
    }
}

// GET /
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "supportdesk",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// POST /query
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let question = body.question.trim();
    if question.is_empty() {
        return Err(ApiError::bad_request("Question cannot be empty"));
    }

    let token = state.shutdown.child_token();
    let orchestrator = state.factory.build()?.with_cancellation(token.clone());

    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let timer = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        token.cancel();
    });
    let result = orchestrator.run(question).await;
    timer.abort();

    info!(
        run_id = %result.run_id,
        steps = result.steps,
        elapsed_ms = result.elapsed_ms,
        success = result.is_success(),
        "Query handled"
    );
    match result.into_outcome() {
        Ok(text) => Ok(Json(QueryResponse::success(text))),
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "Query failed");
            Err(e.into())
        }
    }
}
