//! Raw token extraction.
//!
//! Browsers cannot set headers on a WebSocket handshake, so the live channel
//! also accepts the credential as a `token` query parameter.

use crate::errors::AuthError;

/// Parse an `Authorization` header value of the form `Bearer <token>`.
///
/// The scheme is matched case-insensitively and surrounding whitespace is
/// trimmed.
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
    let header = header.trim();
    let (scheme, rest) = header.split_once(char::is_whitespace).ok_or(AuthError::Malformed)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::Malformed);
    }
    let token = rest.trim();
    if token.is_empty() {
        return Err(AuthError::Malformed);
    }
    Ok(token)
}

/// Pick the credential from the header if present, falling back to the
/// query-carried token.
///
/// A malformed header with a usable query token still resolves to the query
/// token.
pub fn resolve_token<'a>(
    header: Option<&'a str>,
    query: Option<&'a str>,
) -> Result<&'a str, AuthError> {
    let from_header = header.map(bearer_token);
    match (from_header, query.filter(|q| !q.is_empty())) {
        (Some(Ok(token)), _) => Ok(token),
        (_, Some(token)) => Ok(token),
        (Some(Err(e)), None) => Err(e),
        (None, None) => Err(AuthError::Missing),
    }
}
