//! Queue error types with HTTP status code mapping.
//!
//! [`QueueError`] is the central error type of the service. Each variant
//! belongs to an [`ErrorKind`] so callers can tell a lookup miss from an
//! illegal state transition or a retryable storage race, and each maps to
//! an HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::TicketId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2003,
///     "message": "ticket not found: 6c1f…",
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

/// Coarse error category surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A site, room or ticket lookup missed.
    NotFound,
    /// The operation is not legal in the current state.
    InvalidState,
    /// The request itself is malformed.
    InvalidRequest,
    /// The counter allocation lost a race; safe to retry.
    TransientStorageConflict,
    /// The caller cancelled the operation; nothing was committed.
    Cancelled,
    /// The storage layer failed.
    Storage,
    /// Anything else.
    Internal,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status               |
/// |-----------|-------------------|---------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request           |
/// | 2000–2999 | Not Found         | 404 Not Found             |
/// | 3000–3999 | Server / Storage  | 500 / 503 / 408           |
/// | 4000–4999 | Queue State       | 409 Conflict              |
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No site with the given slug.
    #[error("site not found: {0}")]
    SiteNotFound(String),

    /// No room with the given slugs.
    #[error("room not found: {site_slug}/{room_slug}")]
    RoomNotFound {
        /// Site slug.
        site_slug: String,
        /// Room slug.
        room_slug: String,
    },

    /// No ticket with the given id.
    #[error("ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// Only the serving ticket can be completed by id.
    #[error("only the current (serving) ticket can be completed")]
    TicketNotServing(TicketId),

    /// The ticket belongs to another service date.
    #[error("ticket is not for today")]
    TicketNotForToday(TicketId),

    /// Feedback stars outside `1..=5`.
    #[error("stars must be between 1 and 5, got {0}")]
    InvalidStars(i32),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Optimistic counter write lost a race with another allocation.
    #[error("ticket counter changed concurrently; retry")]
    TransientStorageConflict,

    /// The caller's cancellation token fired before commit.
    #[error("operation cancelled")]
    Cancelled,

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Returns the error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SiteNotFound(_) | Self::RoomNotFound { .. } | Self::TicketNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::TicketNotServing(_) | Self::TicketNotForToday(_) | Self::InvalidStars(_) => {
                ErrorKind::InvalidState
            }
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::TransientStorageConflict => ErrorKind::TransientStorageConflict,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::PersistenceError(_) => ErrorKind::Storage,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::SiteNotFound(_) => 2001,
            Self::RoomNotFound { .. } => 2002,
            Self::TicketNotFound(_) => 2003,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::TransientStorageConflict => 3002,
            Self::Cancelled => 3003,
            Self::TicketNotServing(_) => 4001,
            Self::TicketNotForToday(_) => 4002,
            Self::InvalidStars(_) => 4003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::TransientStorageConflict => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl IntoResponse for QueueError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(
            QueueError::SiteNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            QueueError::TicketNotServing(TicketId::new()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(QueueError::InvalidStars(6).kind(), ErrorKind::InvalidState);
        assert_eq!(
            QueueError::TransientStorageConflict.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            QueueError::InvalidRequest("phone".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn response_carries_code_and_status() {
        let response = QueueError::InvalidStars(9).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
