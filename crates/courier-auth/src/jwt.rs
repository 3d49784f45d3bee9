//! HS256 JWT credentials.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use courier_core::{Role, SessionId};

use crate::Authenticator;
use crate::errors::AuthError;

/// Claims carried by a session credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Session the credential is bound to.
    pub session_id: SessionId,
    /// Role granted on that session.
    pub role: Role,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

impl Claims {
    /// Expiry as a timestamp.
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether the credential is bound to `session_id`.
    pub fn is_for(&self, session_id: &str) -> bool {
        !session_id.is_empty() && self.session_id == *session_id
    }
}

/// Signs and verifies credentials with a shared HMAC secret.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    /// Build from a shared secret.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Mint a credential with an explicit expiry.
    pub fn issue_with_expiry(
        &self,
        session_id: &SessionId,
        role: Role,
        expires_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            session_id: session_id.clone(),
            role,
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }
}

impl Authenticator for JwtAuthenticator {
    fn issue(&self, session_id: &SessionId, role: Role, ttl: Duration) -> Result<String, AuthError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| AuthError::Issue(e.to_string()))?;
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::Issue("expiry out of range".into()))?;
        self.issue_with_expiry(session_id, role, expires_at)
    }

    fn authenticate(&self, token: &str) -> Result<Claims, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .inspect_err(|e| debug!(error = %e, "credential rejected"))?;
        Ok(data.claims)
    }
}
