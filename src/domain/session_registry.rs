//! Live-connection registry binding authenticated users to WebSocket
//! connections.
//!
//! [`SessionRegistry`] keeps a bidirectional `user ↔ connection` map under a
//! single [`tokio::sync::RwLock`], so both directions always agree. Each
//! binding carries the connection's bounded outbound queue. A user has at
//! most one live binding; authenticating again from another connection
//! evicts the older one.
//!
//! # Concurrency
//!
//! - `unbind` is idempotent and ignores stale connections.
//! - `send` and `broadcast` clone the target senders under the read lock and
//!   deliver after releasing it, so a slow consumer never blocks binding
//!   changes and a concurrent disconnect cannot cause a duplicate delivery.
//! - Delivery uses `try_send`: a full queue drops the event for that
//!   consumer (best-effort).

use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc, watch};

use super::{ConnectionId, ServerEvent, UserId};

/// Outbound queue of one live connection.
pub type EventSender = mpsc::Sender<ServerEvent>;

#[derive(Debug, Default)]
struct Bindings {
    by_user: HashMap<UserId, (ConnectionId, EventSender)>,
    by_connection: HashMap<ConnectionId, UserId>,
}

/// Process-wide registry of authenticated live connections.
///
/// Constructed once at startup, shared through `Arc`, and torn down with
/// [`SessionRegistry::shutdown`].
#[derive(Debug)]
pub struct SessionRegistry {
    bindings: RwLock<Bindings>,
    shutdown: watch::Sender<bool>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bindings: RwLock::new(Bindings::default()),
            shutdown,
        }
    }

    /// Binds `connection` to `user_id`.
    ///
    /// Replaces any previous binding of the same connection (re-auth as a
    /// different user) and evicts any other connection bound to the same
    /// user. The evicted connection is told via `authentication_error` and
    /// its id is returned.
    pub async fn bind(
        &self,
        connection: ConnectionId,
        user_id: UserId,
        sender: EventSender,
    ) -> Option<ConnectionId> {
        let evicted = {
            let mut bindings = self.bindings.write().await;

            if let Some(previous_user) = bindings.by_connection.insert(connection, user_id)
                && previous_user != user_id
                && bindings
                    .by_user
                    .get(&previous_user)
                    .is_some_and(|(conn, _)| *conn == connection)
            {
                bindings.by_user.remove(&previous_user);
            }

            let evicted = bindings
                .by_user
                .insert(user_id, (connection, sender))
                .filter(|(old_conn, _)| *old_conn != connection);

            if let Some((old_conn, _)) = &evicted {
                bindings.by_connection.remove(old_conn);
            }
            evicted
        };

        tracing::info!(%user_id, %connection, "connection authenticated");

        let (old_conn, old_sender) = evicted?;
        tracing::info!(%user_id, evicted = %old_conn, "evicted older connection");
        let _ = old_sender.try_send(ServerEvent::AuthenticationError {
            error: "session replaced by a newer connection".to_string(),
        });
        Some(old_conn)
    }

    /// Removes the binding of `connection`, if any. Returns the user it was
    /// bound to.
    ///
    /// Safe to call any number of times, and safe when the user has since
    /// re-bound from another connection: that newer binding is kept.
    pub async fn unbind(&self, connection: ConnectionId) -> Option<UserId> {
        let mut bindings = self.bindings.write().await;
        let user_id = bindings.by_connection.remove(&connection)?;
        if bindings
            .by_user
            .get(&user_id)
            .is_some_and(|(conn, _)| *conn == connection)
        {
            bindings.by_user.remove(&user_id);
        }
        drop(bindings);
        tracing::debug!(%user_id, %connection, "connection unbound");
        Some(user_id)
    }

    /// The user currently bound to `connection`.
    pub async fn user_of(&self, connection: ConnectionId) -> Option<UserId> {
        self.bindings
            .read()
            .await
            .by_connection
            .get(&connection)
            .copied()
    }

    /// The connection currently bound to `user_id`.
    pub async fn connection_of(&self, user_id: UserId) -> Option<ConnectionId> {
        self.bindings
            .read()
            .await
            .by_user
            .get(&user_id)
            .map(|(conn, _)| *conn)
    }

    /// Sends `event` to `user_id`'s live connection.
    ///
    /// Returns `true` if the event was queued. A user without a binding, a
    /// closed connection, or a full queue all yield `false`.
    pub async fn send(&self, user_id: UserId, event: ServerEvent) -> bool {
        let sender = {
            let bindings = self.bindings.read().await;
            bindings.by_user.get(&user_id).map(|(_, tx)| tx.clone())
        };
        let Some(sender) = sender else {
            return false;
        };
        deliver(&sender, event, user_id)
    }

    /// Sends `event` to every bound connection as of the call.
    ///
    /// Returns the number of connections the event was queued on.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let targets = self.snapshot().await;
        targets
            .iter()
            .filter(|(user_id, sender)| deliver(sender, event.clone(), *user_id))
            .count()
    }

    /// Point-in-time copy of all bindings.
    pub async fn snapshot(&self) -> Vec<(UserId, EventSender)> {
        let bindings = self.bindings.read().await;
        bindings
            .by_user
            .iter()
            .map(|(user_id, (_, tx))| (*user_id, tx.clone()))
            .collect()
    }

    /// Number of authenticated connections.
    pub async fn len(&self) -> usize {
        self.bindings.read().await.by_user.len()
    }

    /// Returns `true` if nobody is connected.
    pub async fn is_empty(&self) -> bool {
        self.bindings.read().await.by_user.is_empty()
    }

    /// Receiver that flips to `true` when the registry shuts down.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Drops every binding and signals all connections to close.
    pub async fn shutdown(&self) {
        let dropped = {
            let mut bindings = self.bindings.write().await;
            let count = bindings.by_user.len();
            bindings.by_user.clear();
            bindings.by_connection.clear();
            count
        };
        self.shutdown.send_replace(true);
        tracing::info!(connections = dropped, "session registry shut down");
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(sender: &EventSender, event: ServerEvent, user_id: UserId) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            tracing::warn!(
                %user_id,
                event = event.event_name(),
                "dropping event for slow consumer"
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
