//! Identity exchange handlers.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{TokenRequest, TokenResponse};
use crate::api::extract::AuthUser;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, SafeguardError};

/// `POST /auth/token` — Exchange a verified identity for a bearer token.
///
/// # Errors
///
/// Returns [`SafeguardError`] for a malformed identity or a deactivated
/// account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    tag = "Auth",
    summary = "Exchange identity for a token",
    description = "Registers the user on first sight (keyed by email) and issues a bearer token.",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Malformed identity", body = ErrorResponse),
        (status = 401, description = "Account deactivated", body = ErrorResponse),
    )
)]
pub async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, SafeguardError> {
    let session = state
        .users
        .sign_in(&req.email, &req.name, req.phone.as_deref())
        .await?;
    Ok(Json(TokenResponse::bearer(session.token, session.user)))
}

/// `POST /auth/refresh` — Re-issue a token for the caller.
///
/// # Errors
///
/// Returns [`SafeguardError::Unauthenticated`] without a valid token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    summary = "Refresh token",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Fresh token", body = TokenResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<TokenResponse>, SafeguardError> {
    let token = state.users.refresh(user.id)?;
    Ok(Json(TokenResponse::bearer(token, user)))
}

/// Auth routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/token", post(issue_token))
        .route("/auth/refresh", post(refresh_token))
}
