use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{source_name} returned {status}")]
    Upstream {
        source_name: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to decode {source_name} response: {message}")]
    Decode {
        source_name: String,
        message: String,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// A fetch-level failure of one collector, as surfaced by a run.
    #[error("Collector '{collector}' failed: {source}")]
    Collector {
        collector: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Run did not finish within {0:?}")]
    DeadlineExceeded(std::time::Duration),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap a fetch error with the name of the collector that produced it.
    pub fn collector(name: &str, error: AppError) -> Self {
        AppError::Collector {
            collector: name.to_string(),
            source: Box::new(error),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) | AppError::InvalidRecord(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            other => {
                tracing::error!("Internal error: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = axum::Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
