//! Error types for the Cloudsave server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Failures inside a sync provider's backing store
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// S3-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("S3 SDK error: {0}")]
    SdkError(String),
}

/// Sync manager errors, reported to callers inside a `SyncResult`
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("sync disabled")]
    Disabled,

    #[error("sync busy: another sync is in progress")]
    Busy,

    #[error("no active provider")]
    NoActiveProvider,

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("no cloud save found")]
    NoCloudSave,

    #[error("manual resolution required for {0} conflict(s)")]
    ManualResolutionRequired(usize),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Sync(e) => match e {
                SyncError::UnknownProvider(_) => {
                    (StatusCode::NOT_FOUND, "unknown_provider", e.to_string())
                }
                SyncError::ProviderUnavailable(_) | SyncError::NoActiveProvider => {
                    (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable", e.to_string())
                }
                SyncError::Busy => (StatusCode::CONFLICT, "sync_busy", e.to_string()),
                SyncError::Disabled => (StatusCode::FORBIDDEN, "sync_disabled", e.to_string()),
                _ => {
                    tracing::error!("Sync error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "sync_error", e.to_string())
                }
            },
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
