//! HTTP and WebSocket route handlers.

pub mod deliveries;
pub mod location;
pub mod ws;

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, header};
use courier_auth::{Claims, resolve_token};

use crate::errors::ApiError;
use crate::server::AppState;

/// Authenticate the request and check the credential is bound to
/// `session_id`.
///
/// The header wins over `query_token` when both are present.
pub(crate) fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
    session_id: &str,
) -> Result<Claims, ApiError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let token = resolve_token(header, query_token)?;
    let claims = state.auth.authenticate(token)?;
    if !claims.is_for(session_id) {
        return Err(ApiError::Forbidden("delivery mismatch"));
    }
    Ok(claims)
}

pub(crate) fn bad_json(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(format!("bad json: {}", rejection.body_text()))
}
