//! Bearer tokens.
//!
//! The alerting core only needs "token in, user id out", expressed by the
//! [`TokenIssuer`] trait. [`JwtTokenService`] implements it with HS256 JWTs
//! whose `sub` is the user id.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::domain::UserId;
use crate::error::SafeguardError;

/// Default token lifetime in days.
pub const DEFAULT_TOKEN_EXPIRY_DAYS: i64 = 7;

/// Longest accepted token lifetime in days.
pub const MAX_TOKEN_EXPIRY_DAYS: i64 = 365;

/// Turns opaque bearer tokens into user ids and back.
pub trait TokenIssuer: std::fmt::Debug + Send + Sync {
    /// Returns the user a valid, unexpired token was issued to.
    fn verify(&self, token: &str) -> Option<UserId>;

    /// Issues a fresh token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::Internal`] if signing fails.
    fn issue(&self, user_id: UserId) -> Result<String, SafeguardError>;
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: UserId,
    /// Expiry (Unix seconds).
    pub exp: i64,
    /// Issued-at (Unix seconds).
    pub iat: i64,
    /// Unique token id.
    pub jti: String,
}

/// HS256 implementation of [`TokenIssuer`].
pub struct JwtTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry: Duration,
}

impl std::fmt::Debug for JwtTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenService")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl JwtTokenService {
    /// Creates a service signing with `secret`; tokens live `expiry_days`,
    /// clamped to `1..=MAX_TOKEN_EXPIRY_DAYS`.
    #[must_use]
    pub fn new(secret: &str, expiry_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry: Duration::try_days(expiry_days.clamp(1, MAX_TOKEN_EXPIRY_DAYS))
                .unwrap_or_else(|| Duration::days(DEFAULT_TOKEN_EXPIRY_DAYS)),
        }
    }

    /// Decodes and validates a token, returning its claims.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::Unauthenticated`] for a bad signature, a
    /// malformed token, or an expired one.
    pub fn decode_claims(&self, token: &str) -> Result<Claims, SafeguardError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| SafeguardError::Unauthenticated(format!("invalid token: {e}")))
    }

    fn sign(&self, claims: &Claims) -> Result<String, SafeguardError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| SafeguardError::Internal(format!("token signing failed: {e}")))
    }
}

impl TokenIssuer for JwtTokenService {
    fn verify(&self, token: &str) -> Option<UserId> {
        match self.decode_claims(token) {
            Ok(claims) => Some(claims.sub),
            Err(e) => {
                tracing::debug!(error = %e, "token rejected");
                None
            }
        }
    }

    fn issue(&self, user_id: UserId) -> Result<String, SafeguardError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            exp: now
                .checked_add_signed(self.expiry)
                .ok_or_else(|| SafeguardError::Internal("token expiry overflow".to_string()))?
                .timestamp(),
            iat: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        self.sign(&claims)
    }
}
