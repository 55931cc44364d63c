//! Append-only, time-indexed store of location pings.
//!
//! [`LocationStore`] is the hot index the proximity engine reads from. It
//! is split into shards keyed by user id, each an ordered deque behind its
//! own [`tokio::sync::RwLock`], so writers for different users rarely
//! contend and a reader never sees a half-written ping. Within a shard,
//! pings are kept in timestamp order so a window query seeks straight to
//! the window start instead of scanning history.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use super::{Coordinate, PingId, UserId};
use crate::error::SafeguardError;

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 16;

/// `now - window`, saturating at the earliest representable instant.
#[must_use]
pub fn window_start(window: Duration) -> DateTime<Utc> {
    Utc::now()
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// One immutable geolocation sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct LocationPing {
    /// Ping identity.
    pub id: PingId,
    /// Who was here.
    pub user_id: UserId,
    /// Latitude in decimal degrees, within `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in decimal degrees, within `[-180, 180]`.
    pub longitude: f64,
    /// Reported accuracy radius in metres.
    pub accuracy: Option<f64>,
    /// Server-side ingestion time.
    pub timestamp: DateTime<Utc>,
    /// Recorded as part of an emergency trigger.
    pub is_emergency: bool,
}

impl LocationPing {
    /// Builds a ping stamped with the current time from a validated
    /// coordinate.
    #[must_use]
    pub fn new(
        user_id: UserId,
        coordinate: Coordinate,
        accuracy: Option<f64>,
        is_emergency: bool,
    ) -> Self {
        Self::at(user_id, coordinate, accuracy, is_emergency, Utc::now())
    }

    /// Builds a ping with an explicit timestamp.
    #[must_use]
    pub fn at(
        user_id: UserId,
        coordinate: Coordinate,
        accuracy: Option<f64>,
        is_emergency: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PingId::new(),
            user_id,
            latitude: coordinate.latitude(),
            longitude: coordinate.longitude(),
            accuracy,
            timestamp,
            is_emergency,
        }
    }

    /// The ping position as a validated coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidCoordinate`] only for pings that
    /// were not built through [`LocationPing::new`] (e.g. corrupt rows).
    pub fn coordinate(&self) -> Result<Coordinate, SafeguardError> {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone)]
struct IndexedPing {
    seq: u64,
    ping: LocationPing,
}

type Shard = RwLock<VecDeque<IndexedPing>>;

/// Sharded, time-ordered ping index.
#[derive(Debug)]
pub struct LocationStore {
    shards: Vec<Shard>,
    next_seq: AtomicU64,
}

impl LocationStore {
    /// Creates an empty store with [`DEFAULT_SHARDS`] shards.
    #[must_use]
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates an empty store with `count` shards (at least one).
    #[must_use]
    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1))
            .map(|_| RwLock::new(VecDeque::new()))
            .collect();
        Self {
            shards,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Validates and records a ping stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidCoordinate`] for malformed
    /// coordinates; nothing is stored in that case.
    pub async fn record(
        &self,
        user_id: UserId,
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
        is_emergency: bool,
    ) -> Result<PingId, SafeguardError> {
        let coordinate = Coordinate::new(latitude, longitude)?;
        let ping = LocationPing::new(user_id, coordinate, accuracy, is_emergency);
        Ok(self.insert(ping).await)
    }

    /// Indexes an already-built ping, keeping its shard in timestamp order.
    pub async fn insert(&self, ping: LocationPing) -> PingId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        if let Some(shard) = self.shard_for(&ping.user_id) {
            let mut pings = shard.write().await;
            // Server-stamped pings arrive in order, so this is almost always
            // the tail.
            let pos = pings.partition_point(|p| p.ping.timestamp <= ping.timestamp);
            pings.insert(pos, IndexedPing { seq, ping });
        }
        ping.id
    }

    /// Snapshot of every ping with `timestamp >= since`, in arrival order.
    ///
    /// Only the in-window suffix of each shard is visited.
    pub async fn recent_pings(&self, since: DateTime<Utc>) -> RecentPings {
        let mut collected: Vec<IndexedPing> = Vec::new();
        for shard in &self.shards {
            let pings = shard.read().await;
            let start = pings.partition_point(|p| p.ping.timestamp < since);
            collected.extend(pings.range(start..).cloned());
        }
        collected.sort_unstable_by_key(|p| p.seq);
        RecentPings {
            pings: collected.into_iter().map(|p| p.ping).collect(),
        }
    }

    /// Drops indexed pings older than `cutoff`. Returns how many were
    /// removed. Durable history is untouched.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut pings = shard.write().await;
            let stale = pings.partition_point(|p| p.ping.timestamp < cutoff);
            pings.drain(..stale);
            removed += stale;
        }
        removed
    }

    /// Total number of indexed pings.
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }

    /// Returns `true` if no pings are indexed.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn shard_for(&self, user_id: &UserId) -> Option<&Shard> {
        let count = u128::try_from(self.shards.len()).ok()?;
        let idx = usize::try_from(user_id.as_uuid().as_u128() % count).ok()?;
        self.shards.get(idx)
    }
}

impl Default for LocationStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Restartable snapshot returned by [`LocationStore::recent_pings`].
#[derive(Debug, Clone, Default)]
pub struct RecentPings {
    pings: Vec<LocationPing>,
}

impl RecentPings {
    /// Iterates the snapshot from the start; may be called repeatedly.
    pub fn iter(&self) -> std::slice::Iter<'_, LocationPing> {
        self.pings.iter()
    }

    /// Number of pings in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pings.len()
    }

    /// Returns `true` if the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pings.is_empty()
    }
}

impl<'a> IntoIterator for &'a RecentPings {
    type Item = &'a LocationPing;
    type IntoIter = std::slice::Iter<'a, LocationPing>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for RecentPings {
    type Item = LocationPing;
    type IntoIter = std::vec::IntoIter<LocationPing>;

    fn into_iter(self) -> Self::IntoIter {
        self.pings.into_iter()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        let Ok(c) = Coordinate::new(lat, lng) else {
            panic!("valid coordinate");
        };
        c
    }

    #[test]
    fn window_start_saturates_on_huge_windows() {
        assert_eq!(window_start(Duration::MAX), DateTime::<Utc>::MIN_UTC);
        assert!(window_start(Duration::seconds(60)) < Utc::now());
    }

    #[tokio::test]
    async fn recorded_coordinates_round_trip_exactly() {
        let store = LocationStore::new();
        let user = UserId::new();
        let since = Utc::now() - Duration::seconds(1);

        let Ok(id) = store.record(user, 12.971_598_7, 77.594_562_6, Some(5.0), false).await else {
            panic!("valid ping rejected");
        };

        let recent = store.recent_pings(since).await;
        let Some(ping) = recent.iter().find(|p| p.id == id) else {
            panic!("recorded ping missing");
        };
        assert_eq!(ping.user_id, user);
        assert_eq!(ping.latitude, 12.971_598_7);
        assert_eq!(ping.longitude, 77.594_562_6);
        assert_eq!(ping.accuracy, Some(5.0));
    }

    #[tokio::test]
    async fn malformed_coordinates_are_rejected_and_not_stored() {
        let store = LocationStore::new();
        let result = store.record(UserId::new(), 123.0, 0.0, None, false).await;
        assert!(matches!(
            result,
            Err(SafeguardError::InvalidCoordinate { .. })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn window_excludes_older_pings() {
        let store = LocationStore::new();
        let user = UserId::new();
        let now = Utc::now();
        let old = LocationPing::at(user, coord(1.0, 1.0), None, false, now - Duration::minutes(6));
        let fresh = LocationPing::at(user, coord(2.0, 2.0), None, false, now - Duration::minutes(4));
        store.insert(old).await;
        store.insert(fresh).await;

        let recent = store.recent_pings(now - Duration::minutes(5)).await;
        assert_eq!(recent.len(), 1);
        assert!(recent.iter().all(|p| p.id == fresh.id));
    }

    #[tokio::test]
    async fn snapshot_is_in_arrival_order_and_restartable() {
        let store = LocationStore::new();
        let now = Utc::now();
        let mut ids = Vec::new();
        for i in 0..10 {
            let ping = LocationPing::at(UserId::new(), coord(0.0, f64::from(i)), None, false, now);
            ids.push(store.insert(ping).await);
        }

        let recent = store.recent_pings(now - Duration::seconds(1)).await;
        let first: Vec<PingId> = recent.iter().map(|p| p.id).collect();
        let second: Vec<PingId> = recent.iter().map(|p| p.id).collect();
        assert_eq!(first, ids);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn out_of_order_insert_keeps_window_seek_correct() {
        let store = LocationStore::with_shards(1);
        let user = UserId::new();
        let now = Utc::now();
        let late = LocationPing::at(user, coord(0.0, 0.0), None, false, now);
        let early = LocationPing::at(user, coord(0.0, 0.0), None, false, now - Duration::minutes(10));
        store.insert(late).await;
        store.insert(early).await;

        let recent = store.recent_pings(now - Duration::minutes(1)).await;
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn prune_removes_only_stale_pings() {
        let store = LocationStore::new();
        let now = Utc::now();
        let user = UserId::new();
        store
            .insert(LocationPing::at(user, coord(0.0, 0.0), None, false, now - Duration::hours(2)))
            .await;
        store
            .insert(LocationPing::at(user, coord(0.0, 0.0), None, false, now))
            .await;

        let removed = store.prune_before(now - Duration::hours(1)).await;
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_writers_all_land() {
        let store = Arc::new(LocationStore::new());
        let mut handles = Vec::new();
        for w in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let user = UserId::new();
                for i in 0..50 {
                    let lat = f64::from(w) + f64::from(i) / 100.0;
                    let _ = store.record(user, lat, 0.0, None, false).await;
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        assert_eq!(store.len().await, 400);
    }
}
