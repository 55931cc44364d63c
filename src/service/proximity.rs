//! Recency-windowed proximity search over the live ping index.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Coordinate, LocationPing, LocationStore, UserId, window_start};
use crate::error::SafeguardError;
use crate::persistence::Store;

/// Default recency window.
pub const DEFAULT_RECENCY_WINDOW_SECS: i64 = 300;

/// Default emergency fan-out radius.
pub const DEFAULT_NEARBY_RADIUS_KM: f64 = 3.0;

/// One user found near an origin point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct NearbyUser {
    /// Who is nearby.
    pub user_id: UserId,
    /// Great-circle distance from the origin.
    pub distance_km: f64,
    /// Latest known latitude.
    pub latitude: f64,
    /// Latest known longitude.
    pub longitude: f64,
    /// Timestamp of that latest ping.
    pub last_seen: DateTime<Utc>,
}

/// Finds active users whose latest in-window ping lies within a radius.
///
/// Reads the [`LocationStore`] for positions and the [`Store`] only for the
/// active flag of candidates that are already in range.
#[derive(Debug, Clone)]
pub struct ProximityEngine {
    locations: Arc<LocationStore>,
    store: Arc<dyn Store>,
    window: Duration,
}

impl ProximityEngine {
    /// Creates an engine with the given default recency window.
    #[must_use]
    pub fn new(locations: Arc<LocationStore>, store: Arc<dyn Store>, window: Duration) -> Self {
        Self {
            locations,
            store,
            window,
        }
    }

    /// The default recency window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Users near `origin`, using the engine's default window.
    ///
    /// # Errors
    ///
    /// See [`ProximityEngine::find_nearby_within`].
    pub async fn find_nearby(
        &self,
        origin_user: UserId,
        origin: Coordinate,
        radius_km: f64,
    ) -> Result<Vec<NearbyUser>, SafeguardError> {
        self.find_nearby_within(origin_user, origin, radius_km, self.window)
            .await
    }

    /// Users whose most recent ping at or after `now - window` is strictly
    /// closer than `radius_km` to `origin`.
    ///
    /// The origin user and inactive accounts are excluded. Results are
    /// ordered by ascending distance, equal distances by ascending user id.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidRequest`] for a negative or
    /// non-finite radius, and [`SafeguardError::PersistenceError`] if the
    /// active flags cannot be read.
    pub async fn find_nearby_within(
        &self,
        origin_user: UserId,
        origin: Coordinate,
        radius_km: f64,
        window: Duration,
    ) -> Result<Vec<NearbyUser>, SafeguardError> {
        if !(radius_km.is_finite() && radius_km >= 0.0) {
            return Err(SafeguardError::InvalidRequest(format!(
                "radius must be a non-negative number of kilometres, got {radius_km}"
            )));
        }

        let since = window_start(window);
        let recent = self.locations.recent_pings(since).await;

        // Arrival order plus `>=` lets the later arrival win a timestamp tie.
        let mut latest: HashMap<UserId, LocationPing> = HashMap::new();
        for ping in recent {
            if ping.user_id == origin_user {
                continue;
            }
            match latest.entry(ping.user_id) {
                Entry::Occupied(mut slot) => {
                    if ping.timestamp >= slot.get().timestamp {
                        slot.insert(ping);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(ping);
                }
            }
        }

        let in_range: Vec<NearbyUser> = latest
            .into_values()
            .filter_map(|ping| {
                let position = ping.coordinate().ok()?;
                let distance_km = origin.distance_km(&position);
                (distance_km < radius_km).then_some(NearbyUser {
                    user_id: ping.user_id,
                    distance_km,
                    latitude: ping.latitude,
                    longitude: ping.longitude,
                    last_seen: ping.timestamp,
                })
            })
            .collect();

        if in_range.is_empty() {
            return Ok(in_range);
        }

        let candidate_ids: Vec<UserId> = in_range.iter().map(|n| n.user_id).collect();
        let active: HashSet<UserId> = self
            .store
            .get_users(&candidate_ids)
            .await?
            .into_iter()
            .filter(|u| u.active)
            .map(|u| u.id)
            .collect();

        let mut nearby: Vec<NearbyUser> = in_range
            .into_iter()
            .filter(|n| active.contains(&n.user_id))
            .collect();
        nearby.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(nearby)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::User;
    use crate::persistence::MemoryStore;

    struct Fixture {
        engine: ProximityEngine,
        locations: Arc<LocationStore>,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let locations = Arc::new(LocationStore::new());
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;
        let engine = ProximityEngine::new(
            Arc::clone(&locations),
            dyn_store,
            Duration::seconds(DEFAULT_RECENCY_WINDOW_SECS),
        );
        Fixture {
            engine,
            locations,
            store,
        }
    }

    fn coord(lat: f64, lng: f64) -> Coordinate {
        let Ok(c) = Coordinate::new(lat, lng) else {
            panic!("valid coordinate");
        };
        c
    }

    async fn active_user(store: &MemoryStore) -> UserId {
        let user = User::new(format!("{}@example.com", UserId::new()), "U".into(), None);
        let id = user.id;
        store.put_user(user).await;
        id
    }

    async fn ping_at(locations: &LocationStore, user: UserId, lat: f64, lng: f64, age: Duration) {
        locations
            .insert(LocationPing::at(
                user,
                coord(lat, lng),
                None,
                false,
                Utc::now() - age,
            ))
            .await;
    }

    #[tokio::test]
    async fn excludes_origin_user() {
        let f = fixture();
        let origin = active_user(&f.store).await;
        ping_at(&f.locations, origin, 0.0, 0.0, Duration::zero()).await;

        let Ok(found) = f.engine.find_nearby(origin, coord(0.0, 0.0), 5.0).await else {
            panic!("query failed");
        };
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn four_minute_ping_counts_six_minute_ping_does_not() {
        let f = fixture();
        let fresh = active_user(&f.store).await;
        let stale = active_user(&f.store).await;
        ping_at(&f.locations, fresh, 0.0, 0.001, Duration::minutes(4)).await;
        ping_at(&f.locations, stale, 0.0, 0.001, Duration::minutes(6)).await;

        let Ok(found) = f
            .engine
            .find_nearby(UserId::new(), coord(0.0, 0.0), 1.0)
            .await
        else {
            panic!("query failed");
        };
        let ids: Vec<UserId> = found.iter().map(|n| n.user_id).collect();
        assert_eq!(ids, vec![fresh]);
    }

    #[tokio::test]
    async fn only_latest_ping_per_user_counts() {
        let f = fixture();
        let mover = active_user(&f.store).await;
        // Was next door, has since moved ~111 km away.
        ping_at(&f.locations, mover, 0.0, 0.001, Duration::minutes(2)).await;
        ping_at(&f.locations, mover, 1.0, 0.0, Duration::minutes(1)).await;

        let Ok(found) = f
            .engine
            .find_nearby(UserId::new(), coord(0.0, 0.0), 3.0)
            .await
        else {
            panic!("query failed");
        };
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn radius_is_strict_and_results_are_sorted() {
        let f = fixture();
        let near = active_user(&f.store).await;
        let mid = active_user(&f.store).await;
        let far = active_user(&f.store).await;
        ping_at(&f.locations, far, 0.0, 0.05, Duration::zero()).await;
        ping_at(&f.locations, near, 0.0, 0.001, Duration::zero()).await;
        ping_at(&f.locations, mid, 0.0, 0.01, Duration::zero()).await;

        let far_km = coord(0.0, 0.0).distance_km(&coord(0.0, 0.05));
        let Ok(found) = f
            .engine
            .find_nearby(UserId::new(), coord(0.0, 0.0), far_km)
            .await
        else {
            panic!("query failed");
        };
        let ids: Vec<UserId> = found.iter().map(|n| n.user_id).collect();
        assert_eq!(ids, vec![near, mid]);
        assert!(found.iter().all(|n| n.distance_km < far_km));
    }

    #[tokio::test]
    async fn equidistant_users_break_ties_by_id() {
        let f = fixture();
        let a = active_user(&f.store).await;
        let b = active_user(&f.store).await;
        // Mirror images across the origin are exactly equidistant.
        ping_at(&f.locations, a, 0.0, 0.01, Duration::zero()).await;
        ping_at(&f.locations, b, 0.0, -0.01, Duration::zero()).await;

        let Ok(found) = f
            .engine
            .find_nearby(UserId::new(), coord(0.0, 0.0), 5.0)
            .await
        else {
            panic!("query failed");
        };
        let ids: Vec<UserId> = found.iter().map(|n| n.user_id).collect();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn inactive_and_unknown_users_are_excluded() {
        let f = fixture();
        let inactive = active_user(&f.store).await;
        f.store.set_user_active(inactive, false).await;
        ping_at(&f.locations, inactive, 0.0, 0.001, Duration::zero()).await;
        ping_at(&f.locations, UserId::new(), 0.0, 0.001, Duration::zero()).await;

        let Ok(found) = f
            .engine
            .find_nearby(UserId::new(), coord(0.0, 0.0), 5.0)
            .await
        else {
            panic!("query failed");
        };
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn negative_radius_is_rejected() {
        let f = fixture();
        let result = f
            .engine
            .find_nearby(UserId::new(), coord(0.0, 0.0), -1.0)
            .await;
        assert!(matches!(result, Err(SafeguardError::InvalidRequest(_))));
    }
}
