//! Emergency handlers: trigger, dismiss, resolve, status, history.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    DismissEmergencyRequest, HistoryQuery, ResolveEmergencyRequest, SessionClosedResponse,
    TriggerEmergencyRequest, TriggerEmergencyResponse,
};
use crate::api::extract::AuthUser;
use crate::app_state::AppState;
use crate::domain::{EmergencyAlert, EmergencySession, SessionId};
use crate::error::{ErrorResponse, SafeguardError};
use crate::service::EmergencyStatus;

/// Default page size of session history.
const DEFAULT_SESSION_HISTORY: usize = 20;

/// `POST /emergency/trigger` — Raise an emergency.
///
/// # Errors
///
/// Returns [`SafeguardError::DuplicateActiveSession`] if one is already
/// active, or a validation error for a malformed location.
#[utoipa::path(
    post,
    path = "/api/v1/emergency/trigger",
    tag = "Emergency",
    summary = "Trigger emergency",
    description = "Persists a new active session, texts every contact and alerts nearby users and contacts who are online. Succeeds even if some notifications fail.",
    security(("bearer" = [])),
    request_body = TriggerEmergencyRequest,
    responses(
        (status = 200, description = "Emergency raised", body = TriggerEmergencyResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 409, description = "An emergency is already active", body = ErrorResponse),
    )
)]
pub async fn trigger_emergency(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<TriggerEmergencyRequest>,
) -> Result<Json<TriggerEmergencyResponse>, SafeguardError> {
    let summary = state.emergencies.trigger(user.id(), req.into()).await?;
    Ok(Json(summary.into()))
}

/// `POST /emergency/dismiss` — Call off the caller's active emergency.
///
/// # Errors
///
/// Returns [`SafeguardError::SessionNotFound`] unless the session is the
/// caller's and still active.
#[utoipa::path(
    post,
    path = "/api/v1/emergency/dismiss",
    tag = "Emergency",
    summary = "Dismiss emergency",
    security(("bearer" = [])),
    request_body = DismissEmergencyRequest,
    responses(
        (status = 200, description = "Emergency dismissed", body = SessionClosedResponse),
        (status = 404, description = "No such active session", body = ErrorResponse),
    )
)]
pub async fn dismiss_emergency(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<DismissEmergencyRequest>,
) -> Result<Json<SessionClosedResponse>, SafeguardError> {
    let session = state
        .emergencies
        .dismiss(user.id(), req.session_id, req.reason)
        .await?;
    Ok(Json(SessionClosedResponse {
        success: true,
        message: "Emergency dismissed successfully".to_string(),
        session,
    }))
}

/// `POST /emergency/resolve` — Mark the caller's emergency as handled.
///
/// # Errors
///
/// Returns [`SafeguardError::SessionNotFound`] under the dismiss rules.
#[utoipa::path(
    post,
    path = "/api/v1/emergency/resolve",
    tag = "Emergency",
    summary = "Resolve emergency",
    security(("bearer" = [])),
    request_body = ResolveEmergencyRequest,
    responses(
        (status = 200, description = "Emergency resolved", body = SessionClosedResponse),
        (status = 404, description = "No such active session", body = ErrorResponse),
    )
)]
pub async fn resolve_emergency(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ResolveEmergencyRequest>,
) -> Result<Json<SessionClosedResponse>, SafeguardError> {
    let session = state.emergencies.resolve(user.id(), req.session_id).await?;
    Ok(Json(SessionClosedResponse {
        success: true,
        message: "Emergency resolved successfully".to_string(),
        session,
    }))
}

/// `GET /emergency/status` — Whether the caller has an active emergency.
///
/// # Errors
///
/// Returns [`SafeguardError::PersistenceError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/emergency/status",
    tag = "Emergency",
    summary = "Emergency status",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current state", body = EmergencyStatus),
    )
)]
pub async fn emergency_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<EmergencyStatus>, SafeguardError> {
    Ok(Json(state.emergencies.status(user.id()).await?))
}

/// `GET /emergency/history` — The caller's past sessions.
///
/// # Errors
///
/// Returns [`SafeguardError::PersistenceError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/emergency/history",
    tag = "Emergency",
    summary = "Emergency history",
    security(("bearer" = [])),
    params(HistoryQuery),
    responses(
        (status = 200, description = "Sessions, newest first", body = Vec<EmergencySession>),
    )
)]
pub async fn emergency_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<EmergencySession>>, SafeguardError> {
    let sessions = state
        .emergencies
        .history(user.id(), query.limit_or(DEFAULT_SESSION_HISTORY))
        .await?;
    Ok(Json(sessions))
}

/// `GET /emergency/{session_id}/alerts` — Alerts of one of the caller's
/// sessions.
///
/// # Errors
///
/// Returns [`SafeguardError::SessionNotFound`] if the session is not the
/// caller's.
#[utoipa::path(
    get,
    path = "/api/v1/emergency/{session_id}/alerts",
    tag = "Emergency",
    summary = "Session alerts",
    security(("bearer" = [])),
    params(("session_id" = SessionId, Path, description = "Session UUID")),
    responses(
        (status = 200, description = "Alerts of the session", body = Vec<EmergencyAlert>),
        (status = 404, description = "No such session", body = ErrorResponse),
    )
)]
pub async fn session_alerts(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<SessionId>,
) -> Result<Json<Vec<EmergencyAlert>>, SafeguardError> {
    Ok(Json(state.emergencies.alerts(user.id(), session_id).await?))
}

/// Emergency routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/emergency/trigger", post(trigger_emergency))
        .route("/emergency/dismiss", post(dismiss_emergency))
        .route("/emergency/resolve", post(resolve_emergency))
        .route("/emergency/status", get(emergency_status))
        .route("/emergency/history", get(emergency_history))
        .route("/emergency/{session_id}/alerts", get(session_alerts))
}
