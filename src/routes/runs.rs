use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::collectors::scheduler::RunReport;
use crate::error::AppError;
use crate::routes::AppState;

/// GET /api/v1/runs/latest
pub async fn latest(State(state): State<AppState>) -> Result<Json<RunReport>, AppError> {
    state
        .status
        .latest()
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No aggregation run has finished yet".to_string()))
}

/// POST /api/v1/runs
///
/// Asks the scheduler loop for a run. The request is a hint: if a scheduled
/// run starts first the scheduler skips it. A run already in flight is
/// reported with 409.
pub async fn trigger(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.status.is_running() {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "status": "running" })),
        );
    }

    state.status.request_run();
    tracing::info!("Aggregation run requested via API");
    (StatusCode::ACCEPTED, Json(json!({ "status": "requested" })))
}
