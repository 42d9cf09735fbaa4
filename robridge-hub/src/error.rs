//! HTTP error type for the hub API
//!
//! Every failure leaves the hub as `{success: false, error[, details]}` with
//! a matching status code.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// 400: malformed or incomplete request
    #[error("{0}")]
    BadRequest(String),

    /// 404: unknown device or row
    #[error("{0}")]
    NotFound(String),

    /// 500: storage or other internal failure
    ///
    /// `details` is only filled in when the hub runs in development mode.
    #[error("{message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

impl ApiError {
    /// Build an internal error, keeping the cause only when `expose` is set
    pub fn internal(message: impl Into<String>, cause: impl std::fmt::Display, expose: bool) -> Self {
        ApiError::Internal {
            message: message.into(),
            details: expose.then(|| cause.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Internal {
                message,
                details: Some(details),
            } => json!({
                "success": false,
                "error": message,
                "details": details,
            }),
            other => json!({
                "success": false,
                "error": other.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
