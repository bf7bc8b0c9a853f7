//! Crate-wide error taxonomy (ambient A2), one variant per §7 error kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),
    #[error("missing required field: {0}")]
    MissingRequiredField(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("forbidden content: {0}")]
    ForbiddenContent(String),
}

/// The pre-accept-boundary error kinds of §7. Errors after the accept
/// boundary never reach this type; they become `DomainEvent`s instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("routing failed: {0}")]
    Routing(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Validation(ValidationError::MalformedEncoding(e.to_string()))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Internal(format!("storage error: {e}"))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(v) => (StatusCode::BAD_REQUEST, validation_code(v), v.to_string()),
            AppError::Authentication(msg) => (StatusCode::UNAUTHORIZED, "authentication", msg.clone()),
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", self.to_string()),
            AppError::Routing(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "routing", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg.clone()),
        };

        let mut response = Json(json!({
            "status": "error",
            "code": code,
            "message": message,
        }))
        .into_response();

        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        *response.status_mut() = status;
        response
    }
}

fn validation_code(v: &ValidationError) -> &'static str {
    match v {
        ValidationError::MalformedEncoding(_) => "malformed_encoding",
        ValidationError::MissingRequiredField(_) => "missing_required_field",
        ValidationError::OutOfRange(_) => "out_of_range",
        ValidationError::ForbiddenContent(_) => "forbidden_content",
    }
}

/// Errors surfaced after the accept boundary never become HTTP responses;
/// they are classified into a `DomainEvent` instead (§7 propagation policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    RiskViolation,
    BrokerTransient,
    BrokerPermanent,
    Internal,
}
