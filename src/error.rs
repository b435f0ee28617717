//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type for the relay. Each variant
//! maps to a numeric code and an HTTP status. The same code/message pair
//! is sent to WebSocket clients as an `error` message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::SubmissionId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "submission not found: 7",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                    |
/// |-----------|-----------------|--------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request / 403 Forbidden |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict   |
/// | 3000–3999 | Server          | 500 Internal Server Error      |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Inbound message could not be parsed or lacks required fields.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Submission payload is not a JSON object.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Request is well-formed but semantically invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The session's role does not permit the command.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// No submission with the given id exists.
    #[error("submission not found: {0}")]
    SubmissionNotFound(SubmissionId),

    /// The submission has already left the `pending` state.
    #[error("submission {0} has already been decided")]
    AlreadyDecided(SubmissionId),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceFailure(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MalformedMessage(_) => 1001,
            Self::MalformedPayload(_) => 1002,
            Self::InvalidRequest(_) => 1003,
            Self::Forbidden(_) => 1004,
            Self::SubmissionNotFound(_) => 2001,
            Self::AlreadyDecided(_) => 2002,
            Self::PersistenceFailure(_) => 3001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedMessage(_) | Self::MalformedPayload(_) | Self::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::SubmissionNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyDecided(_) => StatusCode::CONFLICT,
            Self::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for errors caused by the server rather than the
    /// client, which are logged at `error` level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::PersistenceFailure(_))
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
