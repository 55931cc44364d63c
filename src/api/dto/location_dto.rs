//! Location DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{GeoPoint, LocationPing, PingId};
use crate::service::NearbyUser;

/// Response body for `POST /location/update`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LocationUpdateResponse {
    /// Always `true` on 200.
    pub success: bool,
    /// Id of the stored ping.
    pub ping_id: PingId,
    /// Server ingestion timestamp.
    pub recorded_at: DateTime<Utc>,
}

impl From<LocationPing> for LocationUpdateResponse {
    fn from(ping: LocationPing) -> Self {
        Self {
            success: true,
            ping_id: ping.id,
            recorded_at: ping.timestamp,
        }
    }
}

/// Query of `GET /location/nearby-users`.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NearbyQuery {
    /// Origin latitude.
    pub lat: f64,
    /// Origin longitude.
    pub lng: f64,
    /// Search radius in kilometres; defaults to the fan-out radius.
    #[serde(default)]
    pub radius: Option<f64>,
}

impl NearbyQuery {
    /// The origin as a point without accuracy.
    #[must_use]
    pub const fn origin(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.lat,
            longitude: self.lng,
            accuracy: None,
        }
    }
}

/// Response body for `GET /location/nearby-users`.
#[derive(Debug, Serialize, ToSchema)]
pub struct NearbyUsersResponse {
    /// Users within the radius, nearest first.
    pub users: Vec<NearbyUser>,
    /// Radius that was searched.
    pub radius_km: f64,
}

/// Response body for `GET /location/history`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LocationHistoryResponse {
    /// Pings, newest first.
    pub pings: Vec<LocationPing>,
}
