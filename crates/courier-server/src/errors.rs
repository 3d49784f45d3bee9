//! Server error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use courier_auth::AuthError;
use tracing::{debug, error};

use crate::store::StoreError;

/// Hub-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The hub was reaped; callers should fetch a fresh one from the registry.
    #[error("hub has been retired")]
    Retired,
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing, malformed, invalid or expired credential.
    #[error("unauthorized")]
    Unauthorized(#[source] AuthError),

    /// Credential is valid but not for this session or role.
    #[error("{0}")]
    Forbidden(&'static str),

    /// Malformed body or invalid coordinates.
    #[error("{0}")]
    BadRequest(String),

    /// Unknown delivery.
    #[error("not found")]
    NotFound,

    /// Request conflicts with the record's current state.
    #[error("{0}")]
    Conflict(String),

    /// Unexpected failure.
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Unauthorized(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            conflict @ StoreError::Conflict { .. } => Self::Conflict(conflict.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(detail) => error!(detail = %detail, "request failed"),
            Self::Unauthorized(cause) => debug!(cause = %cause, "request rejected"),
            _ => debug!(error = %self, "request rejected"),
        }
        (self.status(), self.to_string()).into_response()
    }
}
