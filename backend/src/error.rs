//! Error handling for the Field Health Analysis Platform
//!
//! Every failure of the analysis pipeline maps to one of these variants. The
//! HTTP layer renders them as `{ "error": { code, message, field? } }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Serialize;
use shared::ValidationError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Configuration errors
    #[error("Satellite analysis is not configured: {0}")]
    NotConfigured(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Authentication errors
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Authentication rejected by remote sensing backend: {0}")]
    Authentication(String),

    // Analysis outcomes
    #[error("No imagery available between {start} and {end}")]
    NoImagery { start: NaiveDate, end: NaiveDate },

    // External service errors
    #[error("Remote sensing backend error: {0}")]
    Upstream(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// Coarse class of a failure, as reported in field status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SetupRequired,
    Validation,
    Authentication,
    NoImagery,
    Transient,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AppError::Validation(_) | AppError::NotFound(_) => FailureKind::Validation,
            AppError::NotConfigured(_) | AppError::Configuration(_) => FailureKind::SetupRequired,
            AppError::TokenExchange(_) | AppError::Authentication(_) => FailureKind::Authentication,
            AppError::NoImagery { .. } => FailureKind::NoImagery,
            AppError::Upstream(_) | AppError::Timeout(_) => FailureKind::Transient,
            AppError::Internal(_) | AppError::InternalError(_) => FailureKind::Internal,
        }
    }

    /// Whether the user has to act (set up credentials) before anything works
    pub fn requires_setup(&self) -> bool {
        self.kind() == FailureKind::SetupRequired
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else {
            AppError::Upstream(e.to_string())
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, field) = match &self {
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                Some(e.field().to_string()),
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            AppError::NotConfigured(_) => (StatusCode::SERVICE_UNAVAILABLE, "SETUP_REQUIRED", None),
            AppError::Configuration(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "CONFIGURATION_ERROR", None)
            }
            AppError::TokenExchange(_) => (StatusCode::BAD_GATEWAY, "TOKEN_EXCHANGE_FAILED", None),
            AppError::Authentication(_) => (StatusCode::BAD_GATEWAY, "AUTHENTICATION_ERROR", None),
            AppError::NoImagery { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "NO_IMAGERY", None),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", None),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", None),
            AppError::Internal(_) | AppError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None)
            }
        };

        let message = match &self {
            AppError::InternalError(_) => "An internal server error occurred".to_string(),
            other => other.to_string(),
        };

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers and services
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            AppError::NotConfigured("missing key".into()).kind(),
            FailureKind::SetupRequired
        );
        assert!(AppError::Configuration("bad key".into()).requires_setup());
        assert_eq!(
            AppError::TokenExchange("invalid_grant".into()).kind(),
            FailureKind::Authentication
        );
        assert_eq!(AppError::Timeout("probe".into()).kind(), FailureKind::Transient);
        assert!(!AppError::Upstream("503".into()).requires_setup());
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                AppError::Validation(ValidationError::TooFewPoints { count: 2 }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::NotConfigured("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::NoImagery {
                    start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    end: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AppError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (AppError::TokenExchange("x".into()), StatusCode::BAD_GATEWAY),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
