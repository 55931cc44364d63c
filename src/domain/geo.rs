//! Geographic primitives: validated coordinates and great-circle distance.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::SafeguardError;

/// Mean Earth radius in kilometres used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair that has passed range validation.
///
/// Latitude is in `[-90, 90]`, longitude in `[-180, 180]`, both finite.
/// The only way to build one is [`Coordinate::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Validates and wraps a latitude/longitude pair.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidCoordinate`] when either value is
    /// not finite or lies outside its valid range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, SafeguardError> {
        let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
        let lng_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);
        if lat_ok && lng_ok {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(SafeguardError::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }

    /// Latitude in decimal degrees.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in decimal degrees.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance to `other` in kilometres.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Google Maps link pointing at this coordinate.
    #[must_use]
    pub fn map_link(&self) -> String {
        format!(
            "https://maps.google.com/?q={},{}",
            self.latitude, self.longitude
        )
    }
}

/// Haversine great-circle distance between two points given in degrees.
///
/// `d = 2R·asin(√(sin²(Δlat/2) + cos(lat1)·cos(lat2)·sin²(Δlng/2)))`
#[must_use]
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Wire representation of a position, optionally with GPS accuracy.
///
/// Unvalidated: convert through [`GeoPoint::coordinate`] before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    /// Latitude in decimal degrees.
    #[serde(alias = "lat")]
    pub latitude: f64,
    /// Longitude in decimal degrees.
    #[serde(alias = "lng")]
    pub longitude: f64,
    /// Reported accuracy radius in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl GeoPoint {
    /// Validates the position.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidCoordinate`] for out-of-range
    /// coordinates and [`SafeguardError::InvalidRequest`] for a negative or
    /// non-finite accuracy.
    pub fn coordinate(&self) -> Result<Coordinate, SafeguardError> {
        if let Some(accuracy) = self.accuracy
            && !(accuracy.is_finite() && accuracy >= 0.0)
        {
            return Err(SafeguardError::InvalidRequest(format!(
                "accuracy must be a non-negative number, got {accuracy}"
            )));
        }
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range() {
        assert!(Coordinate::new(90.5, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.1).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn accepts_boundaries() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn zero_distance_to_self() {
        let d = haversine_km(12.97, 77.59, 12.97, 77.59);
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.19).abs() < 0.01, "got {d}");
    }

    #[test]
    fn antipodal_points_do_not_produce_nan() {
        let d = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn geo_point_accepts_short_aliases() {
        let Ok(point) = serde_json::from_str::<GeoPoint>(r#"{"lat":1.5,"lng":2.5}"#) else {
            panic!("aliases should deserialize");
        };
        assert_eq!(point.latitude, 1.5);
        assert_eq!(point.longitude, 2.5);
        assert!(point.accuracy.is_none());
    }

    #[test]
    fn negative_accuracy_is_rejected() {
        let point = GeoPoint {
            latitude: 0.0,
            longitude: 0.0,
            accuracy: Some(-1.0),
        };
        assert!(matches!(
            point.coordinate(),
            Err(SafeguardError::InvalidRequest(_))
        ));
    }

    #[test]
    fn map_link_format() {
        let Ok(c) = Coordinate::new(1.5, -2.25) else {
            panic!("valid coordinate");
        };
        assert_eq!(c.map_link(), "https://maps.google.com/?q=1.5,-2.25");
    }
}
