//! HTTP server implementation using Axum.
//!
//! Thin layer: every handler maps a request onto the service facade and the
//! facade's outcome back onto JSON.

use crate::service::{ExecService, ExecutionOutcome, PauseOutcome};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExecService>,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Deserialize)]
struct ExecuteRequest {
    code: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    caller_token: Option<String>,
}

/// Run the HTTP server on the given port with the provided state.
pub async fn run_server(port: u16, state: AppState) -> std::io::Result<()> {
    let app = Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id/pause", post(pause_session))
        .route("/execute", post(execute))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health() -> &'static str {
    "OK"
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
}

async fn create_session(
    State(state): State<AppState>,
) -> Result<Json<CreateSessionResponse>, (StatusCode, Json<Value>)> {
    let session_id = state
        .service
        .create_session()
        .await
        .map_err(internal_error)?;
    info!("Created session: {}", session_id);
    Ok(Json(CreateSessionResponse { session_id }))
}

async fn execute(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecutionOutcome>, (StatusCode, Json<Value>)> {
    let outcome = state
        .service
        .execute_and_harvest(
            req.session_id.as_deref(),
            &req.code,
            req.caller_token.as_deref(),
        )
        .await
        .map_err(internal_error)?;
    Ok(Json(outcome))
}

async fn pause_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PauseOutcome>, (StatusCode, Json<Value>)> {
    let outcome = state
        .service
        .pause_session(&id)
        .await
        .map_err(internal_error)?;
    Ok(Json(outcome))
}
