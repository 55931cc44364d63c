//! Targeted delivery of [`ServerEvent`]s to live connections.
//!
//! [`EventBus`] is the publishing side the services see. It addresses users,
//! not connections, and resolves them through the shared
//! [`SessionRegistry`]. Users without a live connection are skipped
//! silently; the durable alert rows are the record of what was sent.

use std::collections::HashSet;
use std::sync::Arc;

use super::{ServerEvent, SessionRegistry, UserId};

/// Publisher over the session registry.
#[derive(Debug, Clone)]
pub struct EventBus {
    registry: Arc<SessionRegistry>,
}

impl EventBus {
    /// Creates a bus that delivers through `registry`.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Delivers `event` to one user. Returns `true` if it was queued.
    pub async fn publish_to(&self, user_id: UserId, event: ServerEvent) -> bool {
        self.registry.send(user_id, event).await
    }

    /// Delivers `event` once to each distinct user in `recipients`.
    ///
    /// Returns the number of users the event was queued for.
    pub async fn publish_to_many(&self, recipients: &[UserId], event: &ServerEvent) -> usize {
        let mut seen = HashSet::new();
        let mut delivered = 0;
        for &user_id in recipients {
            if seen.insert(user_id) && self.registry.send(user_id, event.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Delivers `event` to every connected user.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        self.registry.broadcast(event).await
    }

    /// The registry this bus publishes through.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}
