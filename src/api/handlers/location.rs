//! Location handlers: update, nearby search, history.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    HistoryQuery, LocationHistoryResponse, LocationUpdateResponse, NearbyQuery,
    NearbyUsersResponse,
};
use crate::api::extract::AuthUser;
use crate::app_state::AppState;
use crate::domain::GeoPoint;
use crate::error::{ErrorResponse, SafeguardError};

/// `POST /location/update` — Record the caller's position.
///
/// # Errors
///
/// Returns [`SafeguardError::InvalidCoordinate`] for an out-of-range point.
#[utoipa::path(
    post,
    path = "/api/v1/location/update",
    tag = "Location",
    summary = "Update location",
    description = "Appends a ping to the caller's history and the live proximity index. `lat`/`lng` are accepted as aliases.",
    security(("bearer" = [])),
    request_body = GeoPoint,
    responses(
        (status = 200, description = "Ping stored", body = LocationUpdateResponse),
        (status = 400, description = "Malformed coordinate", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn update_location(
    State(state): State<AppState>,
    user: AuthUser,
    Json(point): Json<GeoPoint>,
) -> Result<Json<LocationUpdateResponse>, SafeguardError> {
    let ping = state.locations.record(user.id(), &point).await?;
    Ok(Json(ping.into()))
}

/// `GET /location/nearby-users` — Active users near a point.
///
/// # Errors
///
/// Returns [`SafeguardError::InvalidRequest`] for a bad radius and
/// [`SafeguardError::InvalidCoordinate`] for a bad origin.
#[utoipa::path(
    get,
    path = "/api/v1/location/nearby-users",
    tag = "Location",
    summary = "Nearby users",
    description = "Users whose latest ping inside the recency window is strictly within the radius, nearest first. The caller is never included.",
    security(("bearer" = [])),
    params(NearbyQuery),
    responses(
        (status = 200, description = "Nearby users", body = NearbyUsersResponse),
        (status = 400, description = "Invalid query", body = ErrorResponse),
    )
)]
pub async fn nearby_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<NearbyUsersResponse>, SafeguardError> {
    let radius_km = query
        .radius
        .unwrap_or_else(|| state.locations.nearby_radius_km());
    let users = state
        .locations
        .nearby_users(user.id(), &query.origin(), Some(radius_km))
        .await?;
    Ok(Json(NearbyUsersResponse { users, radius_km }))
}

/// `GET /location/history` — The caller's recent pings.
///
/// # Errors
///
/// Returns [`SafeguardError::PersistenceError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/location/history",
    tag = "Location",
    summary = "Location history",
    security(("bearer" = [])),
    params(HistoryQuery),
    responses(
        (status = 200, description = "Pings, newest first", body = LocationHistoryResponse),
    )
)]
pub async fn location_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<LocationHistoryResponse>, SafeguardError> {
    let pings = state.locations.history(user.id(), query.limit).await?;
    Ok(Json(LocationHistoryResponse { pings }))
}

/// Location routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/location/update", post(update_location))
        .route("/location/nearby-users", get(nearby_users))
        .route("/location/history", get(location_history))
}
