//! # courier-auth
//!
//! Session-scoped bearer credentials.
//!
//! Each delivery session hands out one credential per party. A credential
//! binds a [`SessionId`](courier_core::SessionId) and a
//! [`Role`](courier_core::Role) and carries an expiry; the relay only ever
//! checks it once, when a request or connection is authenticated.
//!
//! - [`Authenticator`]: the seam the server talks to
//! - [`JwtAuthenticator`]: HS256 JWT implementation
//! - [`extract`]: pulling the raw token out of an `Authorization` header or a
//!   `?token=` query value

#![deny(unsafe_code)]

pub mod errors;
pub mod extract;
pub mod jwt;

pub use errors::AuthError;
pub use extract::{bearer_token, resolve_token};
pub use jwt::{Claims, JwtAuthenticator};

use std::time::Duration;

use courier_core::{Role, SessionId};

/// Issues and verifies session credentials.
pub trait Authenticator: Send + Sync {
    /// Mint a credential for `role` on `session_id`, valid for `ttl`.
    fn issue(&self, session_id: &SessionId, role: Role, ttl: Duration) -> Result<String, AuthError>;

    /// Resolve a raw bearer token to its claims, rejecting invalid or expired
    /// credentials.
    fn authenticate(&self, token: &str) -> Result<Claims, AuthError>;
}
