//! Unified error handling for the domains service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not entitled: {0}")]
    NotEntitled(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Verification token expired: {0}")]
    TokenExpired(String),

    #[error("DNS lookup error: {0}")]
    DnsLookup(String),

    #[error("Provisioning error: {message}")]
    Provisioning { message: String, terminal: bool },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a retry of the same operation can reasonably succeed
    /// without operator or tenant intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::DnsLookup(_) => true,
            AppError::Provisioning { terminal, .. } => !terminal,
            _ => false,
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::NotEntitled(msg) => (StatusCode::FORBIDDEN, "not_entitled", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation", msg.clone())
            }
            AppError::TokenExpired(msg) => (StatusCode::GONE, "token_expired", msg.clone()),
            AppError::DnsLookup(msg) => {
                tracing::warn!("DNS lookup error surfaced to caller: {}", msg);
                (StatusCode::BAD_GATEWAY, "dns_lookup_error", msg.clone())
            }
            AppError::Provisioning { message, terminal } => {
                tracing::error!(terminal, "Provisioning error: {}", message);
                (
                    StatusCode::BAD_GATEWAY,
                    "provisioning_error",
                    message.clone(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: None,
        });

        (status, body).into_response()
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}
