pub mod runs;

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::collectors::scheduler::RunStatus;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub status: Arc<RunStatus>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/runs", post(runs::trigger))
        .route("/runs/latest", get(runs::latest));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(&state.pool).await;
    match result {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!("Readiness check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "not ready")
        }
    }
}
