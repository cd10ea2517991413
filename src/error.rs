// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Caller-facing errors. Bodies are fixed plain-text strings so nothing internal leaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    // 401 Unauthorized
    Unauthorized,

    // 403 Forbidden
    Forbidden,

    // 404 Not Found
    NotFound,

    // 405 Method Not Allowed
    MethodNotAllowed,

    // 500 Internal Server Error
    InternalServerError,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "Unauthorized",
            ApiError::Forbidden => "Forbidden",
            ApiError::NotFound => "Not Found",
            ApiError::MethodNotAllowed => "Method Not Allowed",
            ApiError::InternalServerError => "Internal Server Error",
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            self.message(),
        )
            .into_response()
    }
}

/// Internal failures raised by pipeline stages and route handlers.
///
/// These are logged in full and never rendered to the caller; the failure
/// wrapper turns them into [`ApiError::InternalServerError`].
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("route handler reached without an authenticated request context")]
    MissingContext,

    #[error("request body already consumed")]
    BodyConsumed,

    #[error("backend request failed: {0}")]
    Backend(#[from] reqwest::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stage panicked: {0}")]
    Panic(String),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal(message.into())
    }
}
