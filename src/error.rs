//! Gateway error types with HTTP status code mapping.
//!
//! [`SafeguardError`] is the central error type for the service. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! Per-recipient notification failures are deliberately *not* part of this
//! enum; see [`crate::notify::NotifyError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{ContactId, SessionId, UnknownVariant, UserId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2101,
///     "message": "user already has an active emergency session: ...",
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
    /// Numeric error code (see code ranges on [`SafeguardError`]).
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
/// | Range     | Category            | HTTP Status                  |
/// |-----------|---------------------|------------------------------|
/// | 1000–1999 | Validation          | 400 Bad Request              |
/// | 2000–2999 | Not Found / State   | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server              | 500 Internal Server Error    |
/// | 4000–4999 | Authentication      | 401 Unauthorized             |
#[derive(Debug, thiserror::Error)]
pub enum SafeguardError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Latitude or longitude outside the valid range, or not finite.
    #[error("invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate {
        /// Rejected latitude.
        latitude: f64,
        /// Rejected longitude.
        longitude: f64,
    },

    /// Missing, malformed, or expired credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The referenced user does not exist.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// The referenced emergency contact does not exist or is not owned by
    /// the caller.
    #[error("emergency contact not found: {0}")]
    ContactNotFound(ContactId),

    /// No active session with this id is owned by the caller.
    #[error("emergency session not found or no longer active: {0}")]
    SessionNotFound(SessionId),

    /// The caller already has an active emergency session.
    #[error("user already has an active emergency session: {session_id}")]
    DuplicateActiveSession {
        /// The session that is still active.
        session_id: SessionId,
    },

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SafeguardError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidCoordinate { .. } => 1002,
            Self::UserNotFound(_) => 2001,
            Self::ContactNotFound(_) => 2002,
            Self::SessionNotFound(_) => 2003,
            Self::DuplicateActiveSession { .. } => 2101,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::Unauthenticated(_) => 4001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidCoordinate { .. } => StatusCode::BAD_REQUEST,
            Self::UserNotFound(_) | Self::ContactNotFound(_) | Self::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::DuplicateActiveSession { .. } => StatusCode::CONFLICT,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<sqlx::Error> for SafeguardError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl From<UnknownVariant> for SafeguardError {
    fn from(err: UnknownVariant) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl IntoResponse for SafeguardError {
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
    fn duplicate_session_is_conflict() {
        let err = SafeguardError::DuplicateActiveSession {
            session_id: SessionId::new(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), 2101);
    }

    #[test]
    fn invalid_coordinate_message_names_values() {
        let err = SafeguardError::InvalidCoordinate {
            latitude: 91.0,
            longitude: 0.0,
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("91"));
    }

    #[test]
    fn unauthenticated_maps_to_401() {
        let err = SafeguardError::Unauthenticated("missing token".to_string());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
