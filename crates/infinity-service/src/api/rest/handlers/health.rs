//! Health and status handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{extract::State, Json};
use infinity_core::RunStatus;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
    })
}

/// Run status response
#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub version: String,
    pub uptime: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Run named by the status file, if any
    pub run: Option<RunStatus>,
}

/// Status tracker: the run in progress and how far it has got
pub async fn run_status(State(state): State<AppState>) -> ApiResult<Json<RunStatusResponse>> {
    let flow = state.flow.clone();
    let run = tokio::task::spawn_blocking(move || flow.status())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(RunStatusResponse {
        version: state.version.clone(),
        uptime: state.uptime(),
        started_at: state.started_at,
        run,
    }))
}
