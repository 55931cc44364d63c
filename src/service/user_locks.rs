//! Per-user critical sections.
//!
//! [`UserLocks`] hands out one async mutex per user id, so a trigger's
//! check-then-create and a concurrent dismiss for the same user serialize
//! while unrelated users never contend.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::UserId;

/// Lazily populated map of per-user mutexes.
///
/// # Concurrency
///
/// - The outer map is only write-locked to insert a missing user.
/// - The returned guard is owned, so the map lock is never held while
///   waiting for a user's mutex.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: RwLock<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    /// Creates an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and returns `user_id`'s critical section.
    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let existing = self.locks.read().await.get(&user_id).map(Arc::clone);
        let mutex = match existing {
            Some(mutex) => mutex,
            None => {
                let mut map = self.locks.write().await;
                Arc::clone(map.entry(user_id).or_default())
            }
        };
        mutex.lock_owned().await
    }

    /// Drops mutexes nobody is holding or waiting on. Returns how many were
    /// removed.
    pub async fn prune_idle(&self) -> usize {
        let mut map = self.locks.write().await;
        let before = map.len();
        map.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before - map.len()
    }

    /// Number of users with a mutex allocated.
    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    /// Returns `true` if no mutex is allocated.
    pub async fn is_empty(&self) -> bool {
        self.locks.read().await.is_empty()
    }
}
