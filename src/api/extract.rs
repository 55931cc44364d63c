//! Bearer-token authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::app_state::AppState;
use crate::domain::{User, UserId};
use crate::error::SafeguardError;

/// The active user behind the request's `Authorization: Bearer` token.
///
/// Rejects with [`SafeguardError::Unauthenticated`] before the handler
/// runs, so no mutating operation sees an anonymous caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    /// The caller's id.
    #[must_use]
    pub const fn id(&self) -> UserId {
        self.0.id
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = SafeguardError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                SafeguardError::Unauthenticated("missing Authorization header".to_string())
            })?;

        let token = bearer_token(header).ok_or_else(|| {
            SafeguardError::Unauthenticated("expected Authorization: Bearer <token>".to_string())
        })?;

        state.users.authenticate(token).await.map(Self)
    }
}

/// Strips a case-insensitive `Bearer ` scheme.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_scheme() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
