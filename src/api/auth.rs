//! Bearer-token authentication.
//!
//! Access tokens are HS256 JWTs carrying `{sub, role, exp}`. They are minted
//! out of band (see the `issue-token` binary) and verified on every
//! authenticated request by the [`AuthUser`] extractor.

use std::fmt;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::domain::{Actor, Role, UserId};
use crate::error::HealthPalError;

/// Access-token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: uuid::Uuid,
    /// Caller role.
    pub role: Role,
    /// Expiry as unix seconds.
    pub exp: u64,
}

/// Signing and verification keys derived from one shared secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    /// Builds HS256 keys from `secret`.
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Signs a token for `user` expiring `ttl_secs` after `now` (unix
    /// seconds).
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Internal`] if encoding fails.
    pub fn issue(
        &self,
        user: UserId,
        role: Role,
        now: u64,
        ttl_secs: u64,
    ) -> Result<String, HealthPalError> {
        let claims = Claims {
            sub: user.into(),
            role,
            exp: now.saturating_add(ttl_secs),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| HealthPalError::Internal(format!("token encoding failed: {e}")))
    }

    /// Verifies `token` and returns the caller it names.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Unauthenticated`] for invalid or expired
    /// tokens.
    pub fn verify(&self, token: &str) -> Result<Actor, HealthPalError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| HealthPalError::Unauthenticated(format!("invalid token: {e}")))?;
        Ok(Actor::new(UserId::from_uuid(data.claims.sub), data.claims.role))
    }
}

/// The authenticated caller, extracted from `Authorization: Bearer <jwt>`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Actor);

impl AuthUser {
    /// Caller id.
    #[must_use]
    pub fn id(&self) -> UserId {
        self.0.id
    }

    /// Checks that the caller holds one of `allowed`.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Forbidden`] otherwise.
    pub fn require(&self, allowed: &[Role]) -> Result<(), HealthPalError> {
        self.0.require_role(allowed)
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = HealthPalError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| HealthPalError::Unauthenticated("missing bearer token".to_string()))?
            .to_str()
            .map_err(|_| HealthPalError::Unauthenticated("malformed authorization header".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| HealthPalError::Unauthenticated("expected a bearer token".to_string()))?;
        state.jwt.verify(token.trim()).map(Self)
    }
}
