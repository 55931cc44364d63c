//! REST endpoint handlers organized by resource.

pub mod auth;
pub mod emergency;
pub mod location;
pub mod system;
pub mod user;
pub mod voice;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(auth::routes())
        .merge(user::routes())
        .merge(location::routes())
        .merge(emergency::routes())
        .merge(voice::routes())
}
