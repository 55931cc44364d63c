//! # safeguard-gateway
//!
//! REST API and WebSocket gateway for a personal-safety alerting service.
//!
//! Users register emergency contacts, stream their location over a live
//! connection, and raise emergencies. An emergency is persisted first and
//! then fanned out: SMS to every contact, a real-time `emergency_alert` to
//! users currently nearby and to contacts who are themselves users, and an
//! `emergency_dismissed` / `emergency_resolved` broadcast when it ends.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── EmergencyService, LocationService, UserService, VoiceService (service/)
//!     ├── ProximityEngine (service/) ── LocationStore (domain/)
//!     ├── EventBus ── SessionRegistry (domain/)
//!     │
//!     ├── Notifier (notify/)
//!     └── Store: PostgreSQL or in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod persistence;
pub mod service;
pub mod ws;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;

/// Builds the full application router: REST endpoints plus `GET /ws`.
///
/// Cross-cutting layers (tracing, CORS, timeouts) are left to the caller.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws::handler::ws_handler))
        .with_state(state)
}
