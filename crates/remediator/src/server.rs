//! HTTP server.
//!
//! Provides REST API endpoints for:
//! - Health checks
//! - Receiving Alertmanager webhooks
//! - Querying session status and stored context
//! - Agent discovery and invocation (`remediate-alert`)

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::alerts::{AlertIngestor, AlertmanagerAlert, AlertmanagerPayload};
use crate::collaborators::{
    CapabilityDescriptor, CapabilityRequest, OperationDescriptor, OP_REMEDIATE_ALERT,
};
use crate::context::ContextKey;
use crate::error::{ProtocolError, StoreError};
use crate::tools::{ErrorKind, ToolError, ToolResult};

/// Server state shared across handlers.
pub struct ServerState {
    pub ingestor: AlertIngestor,
}

impl ServerState {
    #[must_use]
    pub fn new(ingestor: AlertIngestor) -> Self {
        Self { ingestor }
    }
}

/// Descriptor advertised at `/.well-known/agent.json`.
#[must_use]
pub fn agent_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: "remediator".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Diagnoses, validates, executes and reports on alert-driven remediations"
            .to_string(),
        operations: vec![OperationDescriptor::new(
            OP_REMEDIATE_ALERT,
            "Start a remediation session for one Alertmanager alert",
        )],
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/alerts", post(alerts_handler))
        .route("/api/sessions", get(sessions_handler))
        .route("/api/sessions/{id}", get(session_handler))
        .route("/api/sessions/{id}/context/{key}", get(context_handler))
        .route("/.well-known/agent.json", get(agent_card_handler))
        .route("/invoke", post(invoke_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run_server(state: Arc<ServerState>, addr: &str) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Remediator listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    active_sessions: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.ingestor.orchestrator().registry().active_count().await,
    })
}

async fn alerts_handler(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<AlertmanagerPayload>,
) -> impl IntoResponse {
    let summary = state.ingestor.ingest(payload).await;
    info!(
        processed = summary.processed,
        created = summary.created,
        duplicates = summary.duplicates,
        ignored = summary.ignored,
        "Alert webhook processed"
    );
    Json(summary)
}

async fn sessions_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.ingestor.orchestrator().registry().list().await)
}

async fn session_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Response {
    match state.ingestor.orchestrator().registry().get(&id).await {
        Some(summary) => Json(summary).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("session {id} not found")),
    }
}

async fn context_handler(
    State(state): State<Arc<ServerState>>,
    Path((id, key)): Path<(String, String)>,
) -> Response {
    let key: ContextKey = match key.parse() {
        Ok(key) => key,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    match state.ingestor.orchestrator().store().get(&id, key).await {
        Ok(entry) => Json(entry).into_response(),
        Err(e @ StoreError::NotFound { .. }) => error_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e @ StoreError::InvalidSessionId(_)) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            warn!(session_id = %id, key = %key, error = %e, "Context read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn agent_card_handler() -> impl IntoResponse {
    Json(agent_descriptor())
}

async fn invoke_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CapabilityRequest>,
) -> impl IntoResponse {
    if request.operation != OP_REMEDIATE_ALERT {
        return Json(ToolResult::Failure(ToolError::invalid_input(format!(
            "unsupported operation '{}'; supported: {OP_REMEDIATE_ALERT}",
            request.operation
        ))));
    }

    let alert: AlertmanagerAlert = match serde_json::from_value(request.payload) {
        Ok(alert) => alert,
        Err(e) => {
            return Json(ToolResult::Failure(ToolError::invalid_input(format!(
                "payload is not an Alertmanager alert: {e}"
            ))))
        }
    };

    info!(
        caller_session = %request.session_id,
        alert = %alert.name(),
        "remediate-alert invoked"
    );
    let result = match state.ingestor.ingest_alert(alert).await {
        Ok(decision) => match serde_json::to_value(decision) {
            Ok(value) => ToolResult::Success(value),
            Err(e) => ToolResult::Failure(ToolError::new(ErrorKind::Unknown, e.to_string())),
        },
        Err(e) => ToolResult::Failure(ToolError::new(protocol_error_kind(&e), e.to_string())),
    };
    Json(result)
}

/// Error kind reported to `/invoke` callers when ingestion fails.
fn protocol_error_kind(error: &ProtocolError) -> ErrorKind {
    match error {
        ProtocolError::DuplicateSession(_)
        | ProtocolError::OutOfOrder { .. }
        | ProtocolError::InvalidTransition { .. }
        | ProtocolError::Store(StoreError::AlreadyWritten { .. } | StoreError::WrongPhase { .. }) => {
            ErrorKind::Conflict
        }
        ProtocolError::UnknownSession(_) | ProtocolError::Store(StoreError::NotFound { .. }) => {
            ErrorKind::NotFound
        }
        ProtocolError::Store(StoreError::InvalidSessionId(_)) => ErrorKind::InvalidInput,
        ProtocolError::Store(_) => ErrorKind::Unknown,
    }
}
