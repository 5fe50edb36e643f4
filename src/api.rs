//! REST API server for the analysis orchestrator
//!
//! Thin transport adapter over the session lifecycle operations; the
//! orchestrator itself stays transport-agnostic.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::agent::Orchestrator;
use crate::audit::compute_context_hash;
use crate::error::OrchestrationError;
use crate::models::{StepStatus, TurnOutcome};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

fn error_status(error: &OrchestrationError) -> StatusCode {
    match error {
        OrchestrationError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn turn_json(outcome: &TurnOutcome) -> serde_json::Value {
    let steps: Vec<serde_json::Value> = outcome
        .plan
        .as_ref()
        .map(|plan| {
            plan.steps
                .iter()
                .zip(outcome.trace.results.iter())
                .map(|(step, result)| {
                    serde_json::json!({
                        "operation": step.operation.kind(),
                        "status": result.status,
                        "attempts": result.attempts,
                        "duration_ms": result.duration_ms,
                        "error": result.error,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    serde_json::json!({
        "turn_id": outcome.turn_id,
        "session_id": outcome.session_id,
        "response": outcome.response_text,
        "disposition": outcome.disposition,
        "entities": outcome.resolved.entities,
        "category": outcome.resolved.category,
        "confidence": outcome.interpretation.confidence,
        "steps": steps,
        "failed_steps": outcome
            .trace
            .results
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
            .count(),
        "execution_time_ms": outcome.execution_time_ms,
    })
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Session Endpoints
/// =============================

async fn start_session(
    State(state): State<ApiState>,
    Json(req): Json<StartSessionRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.start_session(req.session_id).await {
        Ok(session_id) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id,
            }))),
        ),
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::error(format!("Failed to start session: {}", e))),
        ),
    }
}

async fn submit_turn(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(%session_id, "Received turn request");

    match state.orchestrator.submit(&session_id, &req.text).await {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::success(turn_json(&outcome)))),
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::error(format!("Turn failed: {}", e))),
        ),
    }
}

async fn reset_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.reset_session(&session_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id,
                "reset": true,
            }))),
        ),
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::error(format!("Failed to reset session: {}", e))),
        ),
    }
}

async fn get_context(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.get_context(&session_id).await {
        Ok(context) => {
            let context_hash = compute_context_hash(&context);
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "context": context,
                    "context_hash": context_hash,
                }))),
            )
        }
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::error(format!("Failed to load context: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(start_session))
        .route("/api/sessions/:session_id/turns", post(submit_turn))
        .route("/api/sessions/:session_id/reset", post(reset_session))
        .route("/api/sessions/:session_id/context", get(get_context))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
