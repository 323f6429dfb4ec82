//! Common error types for the generation service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Generation queue is full ({0} requests pending)")]
    QueueFull(usize),

    #[error("Timed out waiting for the engine after {0} ms")]
    QueueTimeout(u64),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and machine readable code for this error
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            AppError::Json(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_json"),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "engine_unreachable"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::InvalidInput(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request"),
            AppError::InvalidImage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "invalid_image"),
            AppError::ResourceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "resource_unavailable")
            }
            AppError::QueueFull(_) => (StatusCode::SERVICE_UNAVAILABLE, "queue_full"),
            AppError::QueueTimeout(_) => (StatusCode::SERVICE_UNAVAILABLE, "queue_timeout"),
            AppError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded"),
            AppError::SynthesisFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "synthesis_failed")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
        }
    }
}

/// A single rejected request field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every field that failed validation, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.field.as_str()).collect()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "Invalid generation parameters: {}", joined)
    }
}

/// Error body returned by every endpoint.
///
/// `status` and `error` match what existing clients parse; `code` and
/// `details` are extra.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ValidationErrors>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();

        let details = match &self {
            AppError::Validation(errors) => Some(errors.clone()),
            _ => None,
        };

        let body = Json(ErrorResponse {
            status: "error",
            error: self.to_string(),
            code,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
