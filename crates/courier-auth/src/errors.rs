//! Auth error types.

/// Errors produced while issuing or checking credentials.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("missing bearer credential")]
    Missing,

    /// An `Authorization` header was present but not a bearer credential.
    #[error("malformed authorization header")]
    Malformed,

    /// Signature, encoding or claims were rejected.
    #[error("invalid credential: {0}")]
    Invalid(String),

    /// The credential was valid but has expired.
    #[error("credential expired")]
    Expired,

    /// Signing a new credential failed.
    #[error("failed to issue credential: {0}")]
    Issue(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid(err.to_string()),
        }
    }
}
