//! Location ingestion: durable history plus the hot proximity index.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::proximity::{NearbyUser, ProximityEngine};
use crate::domain::{
    EventBus, GeoPoint, LocationPing, LocationStore, ServerEvent, UserId, window_start,
};
use crate::error::SafeguardError;
use crate::persistence::Store;

/// Largest radius a client may search with.
pub const MAX_QUERY_RADIUS_KM: f64 = 50.0;

/// Default page size of location history.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Records pings and answers proximity queries for clients.
#[derive(Debug, Clone)]
pub struct LocationService {
    store: Arc<dyn Store>,
    locations: Arc<LocationStore>,
    proximity: ProximityEngine,
    events: EventBus,
    nearby_radius_km: f64,
}

impl LocationService {
    /// Creates the service. `nearby_radius_km` bounds who sees a user's
    /// live position.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        locations: Arc<LocationStore>,
        proximity: ProximityEngine,
        events: EventBus,
        nearby_radius_km: f64,
    ) -> Self {
        Self {
            store,
            locations,
            proximity,
            events,
            nearby_radius_km,
        }
    }

    /// The configured fan-out radius.
    #[must_use]
    pub const fn nearby_radius_km(&self) -> f64 {
        self.nearby_radius_km
    }

    /// Validates and records a ping: durable history first, then the index.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidCoordinate`] or
    /// [`SafeguardError::InvalidRequest`] for a malformed point (nothing is
    /// stored), and [`SafeguardError::PersistenceError`] if the history
    /// write fails.
    pub async fn record(
        &self,
        user_id: UserId,
        point: &GeoPoint,
    ) -> Result<LocationPing, SafeguardError> {
        let coordinate = point.coordinate()?;
        let ping = LocationPing::new(user_id, coordinate, point.accuracy, false);
        self.store.append_ping(&ping).await?;
        self.locations.insert(ping).await;
        tracing::debug!(%user_id, ping_id = %ping.id, "location recorded");
        Ok(ping)
    }

    /// Records a ping and pushes `location_broadcast` to users currently
    /// within the fan-out radius. Returns the ping and how many live
    /// connections were told.
    ///
    /// `client_timestamp` is echoed in the broadcast only; the stored ping
    /// carries the ingestion time.
    ///
    /// # Errors
    ///
    /// See [`LocationService::record`].
    pub async fn share(
        &self,
        user_id: UserId,
        point: &GeoPoint,
        client_timestamp: Option<DateTime<Utc>>,
    ) -> Result<(LocationPing, usize), SafeguardError> {
        let ping = self.record(user_id, point).await?;
        let coordinate = ping.coordinate()?;
        let neighbours = self
            .proximity
            .find_nearby(user_id, coordinate, self.nearby_radius_km)
            .await?;
        if neighbours.is_empty() {
            return Ok((ping, 0));
        }

        let event = ServerEvent::LocationBroadcast {
            user_id,
            location: *point,
            timestamp: client_timestamp.unwrap_or(ping.timestamp),
        };
        let recipients: Vec<UserId> = neighbours.iter().map(|n| n.user_id).collect();
        let delivered = self.events.publish_to_many(&recipients, &event).await;
        Ok((ping, delivered))
    }

    /// Active users near a point, excluding the caller.
    ///
    /// `radius_km` defaults to the fan-out radius and may not exceed
    /// [`MAX_QUERY_RADIUS_KM`].
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidCoordinate`] or
    /// [`SafeguardError::InvalidRequest`] for a malformed query.
    pub async fn nearby_users(
        &self,
        user_id: UserId,
        point: &GeoPoint,
        radius_km: Option<f64>,
    ) -> Result<Vec<NearbyUser>, SafeguardError> {
        let origin = point.coordinate()?;
        let radius_km = radius_km.unwrap_or(self.nearby_radius_km);
        if radius_km > MAX_QUERY_RADIUS_KM {
            return Err(SafeguardError::InvalidRequest(format!(
                "radius must not exceed {MAX_QUERY_RADIUS_KM} km"
            )));
        }
        self.proximity.find_nearby(user_id, origin, radius_km).await
    }

    /// The caller's latest pings, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    pub async fn history(
        &self,
        user_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<LocationPing>, SafeguardError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 1000);
        self.store.location_history(user_id, limit).await
    }

    /// Loads the last `retention` of durable history into the index.
    /// Returns the number of pings loaded.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    pub async fn warm_index(&self, retention: Duration) -> Result<usize, SafeguardError> {
        let pings = self.store.query_pings_since(window_start(retention)).await?;
        let count = pings.len();
        for ping in pings {
            self.locations.insert(ping).await;
        }
        Ok(count)
    }

    /// Drops index entries older than `retention`. Returns how many went.
    pub async fn prune_index(&self, retention: Duration) -> usize {
        self.locations.prune_before(window_start(retention)).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::{ConnectionId, Coordinate, SessionRegistry, User};
    use crate::persistence::MemoryStore;

    struct Harness {
        service: LocationService,
        store: Arc<MemoryStore>,
        locations: Arc<LocationStore>,
        registry: Arc<SessionRegistry>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;
        let locations = Arc::new(LocationStore::new());
        let registry = Arc::new(SessionRegistry::new());
        let proximity = ProximityEngine::new(
            Arc::clone(&locations),
            Arc::clone(&dyn_store),
            Duration::minutes(5),
        );
        let service = LocationService::new(
            dyn_store,
            Arc::clone(&locations),
            proximity,
            EventBus::new(Arc::clone(&registry)),
            3.0,
        );
        Harness {
            service,
            store,
            locations,
            registry,
        }
    }

    async fn user(store: &MemoryStore) -> UserId {
        let user = User::new(format!("{}@example.com", UserId::new()), "U".into(), None);
        let id = user.id;
        store.put_user(user).await;
        id
    }

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
            accuracy: Some(8.0),
        }
    }

    #[tokio::test]
    async fn record_writes_history_and_index() {
        let h = harness();
        let me = user(&h.store).await;
        let Ok(ping) = h.service.record(me, &point(1.0, 2.0)).await else {
            panic!("record failed");
        };
        assert_eq!(ping.accuracy, Some(8.0));
        assert_eq!(h.store.ping_count().await, 1);
        assert_eq!(h.locations.len().await, 1);
    }

    #[tokio::test]
    async fn malformed_point_stores_nothing() {
        let h = harness();
        let me = user(&h.store).await;
        assert!(h.service.record(me, &point(0.0, 181.0)).await.is_err());
        assert_eq!(h.store.ping_count().await, 0);
        assert!(h.locations.is_empty().await);
    }

    #[tokio::test]
    async fn share_reaches_only_nearby_users() {
        let h = harness();
        let me = user(&h.store).await;
        let near = user(&h.store).await;
        let far = user(&h.store).await;
        let _ = h.service.record(near, &point(0.0, 0.001)).await;
        let _ = h.service.record(far, &point(10.0, 10.0)).await;

        let (near_tx, mut near_rx) = mpsc::channel(4);
        let (far_tx, mut far_rx) = mpsc::channel(4);
        h.registry.bind(ConnectionId::new(), near, near_tx).await;
        h.registry.bind(ConnectionId::new(), far, far_tx).await;

        let Ok((_, delivered)) = h.service.share(me, &point(0.0, 0.0), None).await else {
            panic!("share failed");
        };
        assert_eq!(delivered, 1);
        let Some(ServerEvent::LocationBroadcast { user_id, .. }) = near_rx.recv().await else {
            panic!("nearby user should see the broadcast");
        };
        assert_eq!(user_id, me);
        assert!(far_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn share_runs_on_a_spawned_task() {
        let h = harness();
        let me = user(&h.store).await;
        let near = user(&h.store).await;
        let _ = h.service.record(near, &point(0.0, 0.001)).await;
        let (near_tx, _near_rx) = mpsc::channel(4);
        h.registry.bind(ConnectionId::new(), near, near_tx).await;

        let service = h.service.clone();
        let task = tokio::spawn(async move {
            let origin = point(0.0, 0.0);
            service.share(me, &origin, None).await.map(|(_, n)| n)
        });
        let Ok(Ok(delivered)) = task.await else {
            panic!("spawned share failed");
        };
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn configured_retention_keeps_pings_inside_recency_window() {
        let Ok(config) = crate::config::SafeguardConfig::from_lookup(|key| match key {
            "LOCATION_RETENTION_SECS" => Some("60".to_string()),
            _ => None,
        }) else {
            panic!("valid environment must load");
        };
        let h = harness();
        let me = user(&h.store).await;
        let other = user(&h.store).await;
        let Ok(c) = Coordinate::new(0.0, 0.001) else {
            panic!("valid coordinate");
        };
        h.locations
            .insert(LocationPing::at(
                other,
                c,
                None,
                false,
                Utc::now() - Duration::minutes(4),
            ))
            .await;

        assert_eq!(h.service.prune_index(config.location_retention()).await, 0);
        let Ok(nearby) = h.service.nearby_users(me, &point(0.0, 0.0), None).await else {
            panic!("nearby query failed");
        };
        assert_eq!(nearby.len(), 1);
    }

    #[tokio::test]
    async fn oversized_radius_is_rejected() {
        let h = harness();
        let me = user(&h.store).await;
        let result = h
            .service
            .nearby_users(me, &point(0.0, 0.0), Some(MAX_QUERY_RADIUS_KM + 1.0))
            .await;
        assert!(matches!(result, Err(SafeguardError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn warm_index_restores_recent_history_only() {
        let h = harness();
        let me = user(&h.store).await;
        let Ok(c) = Coordinate::new(0.0, 0.0) else {
            panic!("valid coordinate");
        };
        let now = Utc::now();
        let _ = h
            .store
            .append_ping(&LocationPing::at(me, c, None, false, now - Duration::hours(3)))
            .await;
        let _ = h
            .store
            .append_ping(&LocationPing::at(me, c, None, false, now - Duration::minutes(1)))
            .await;

        let Ok(loaded) = h.service.warm_index(Duration::hours(1)).await else {
            panic!("warm failed");
        };
        assert_eq!(loaded, 1);
        assert_eq!(h.locations.len().await, 1);
    }
}
