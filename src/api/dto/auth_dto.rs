//! Identity exchange DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::User;

/// Request body for `POST /auth/token`.
///
/// Stands in for a verified identity-provider assertion.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// Verified email address; the account key.
    pub email: String,
    /// Display name used when the account is created.
    pub name: String,
    /// Optional phone number.
    #[serde(default)]
    pub phone: Option<String>,
}

/// Response body of the token endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    /// Bearer token.
    pub access_token: String,
    /// Always `"bearer"`.
    pub token_type: String,
    /// The signed-in account.
    pub user: User,
}

impl TokenResponse {
    /// Wraps a freshly issued token.
    #[must_use]
    pub fn bearer(access_token: String, user: User) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
            user,
        }
    }
}
