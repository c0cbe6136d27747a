use std::{fmt::Display, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// RepoError
///
/// Failures raised by the persistence layer. Never shown to API callers verbatim.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

/// ApiError
///
/// The complete error taxonomy of the HTTP surface. Each variant maps to exactly one
/// status code and renders as `{ "error": "<message>" }`.
#[derive(Debug, Error, PartialEq)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

/// LogInternal
///
/// Converts any failure into a generic `ApiError::Internal` carrying only a static
/// message. The underlying error is logged and then dropped.
pub trait LogInternal<T> {
    fn or_internal(self, message: &'static str) -> Result<T, ApiError>;
}

impl<T, E: Display> LogInternal<T> for Result<T, E> {
    fn or_internal(self, message: &'static str) -> Result<T, ApiError> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{}", message);
            ApiError::Internal(message)
        })
    }
}
