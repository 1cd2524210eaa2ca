//! Error types for infinity-service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use infinity_core::ExperimentError;
use serde::Serialize;
use thiserror::Error;

/// Generic message for protocol corruption; details go to the log only
pub const MAP_ERROR_MESSAGE: &str = "Map error: please inform the experiment supervisor";

/// Generic message for an unknown page
pub const PAGE_ERROR_MESSAGE: &str = "Page error: please inform the experiment supervisor";

/// Service-level errors
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request field that cannot be decoded
    #[error("Validation error: {0}")]
    Validation(String),

    /// `page` names no known page
    #[error("unknown page '{0}'")]
    UnknownPage(String),

    /// Failure inside the experiment flow
    #[error(transparent)]
    Experiment(#[from] ExperimentError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::UnknownPage(_) => (StatusCode::BAD_REQUEST, "PAGE_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Experiment(err) => match err {
                ExperimentError::Validation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
                }
                ExperimentError::MalformedMap { .. } | ExperimentError::EmptyMap => {
                    (StatusCode::BAD_REQUEST, "MAP_ERROR")
                }
                ExperimentError::Parse { .. }
                | ExperimentError::IncompleteSet { .. }
                | ExperimentError::DuplicateStimulus { .. }
                | ExperimentError::UnexpectedFinalPosition { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "DATA_ERROR")
                }
                ExperimentError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (error, details) = match &self {
            ApiError::Experiment(err) if err.is_map_error() => (
                MAP_ERROR_MESSAGE.to_string(),
                Some(serde_json::json!({ "reason": err.to_string() })),
            ),
            ApiError::UnknownPage(page) => (
                PAGE_ERROR_MESSAGE.to_string(),
                Some(serde_json::json!({ "page": page })),
            ),
            other => (other.to_string(), None),
        };

        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        }

        let body = ErrorResponse {
            error,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
