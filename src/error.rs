use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Local storage transaction failed: {0}")]
    NotPersisted(#[source] sqlx::Error),

    #[error("Snapshot encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found")]
    NotFound,

    #[error("No internet connection")]
    Offline,

    #[error("Sync already in progress")]
    SyncInProgress,

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Offline => (
                StatusCode::SERVICE_UNAVAILABLE,
                "No internet connection".to_string(),
            ),
            AppError::SyncInProgress => (
                StatusCode::CONFLICT,
                "Sync already in progress".to_string(),
            ),
            AppError::Delivery(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::NotPersisted(e) => {
                error!("storage transaction failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Local storage transaction failed".to_string(),
                )
            }
            AppError::Serialization(e) => {
                error!("snapshot encoding failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}
