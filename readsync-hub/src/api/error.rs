//! HTTP error mapping for hub API handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use readsync_common::Error;

/// Error type returned by hub API handlers
///
/// Every failing endpoint produces the same body shape:
/// `{"error": "<message>"}` with the status code carried by the variant.
#[derive(Debug)]
pub enum ApiError {
    /// Session id unknown to the registry (404)
    NotFound(String),
    /// Session exists but has already ended (410)
    Gone(String),
    /// Request body failed validation (400)
    BadRequest(String),
    /// Session id already taken (409)
    Conflict(String),
    /// Anything else (500)
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            Error::SessionEnded(_) => ApiError::Gone(err.to_string()),
            Error::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            Error::MalformedReport(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Gone(msg) => (StatusCode::GONE, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
