//! Emergency orchestration: trigger, dismiss, resolve.
//!
//! A session moves `none → active → {dismissed | resolved}`. Every trigger
//! runs the same pipeline:
//!
//! 1. Under the user's critical section: reject a second active session,
//!    read contacts, search nearby users, and commit session, emergency
//!    ping and alerts as one unit.
//! 2. Outside it: text each contact with a per-contact deadline, then push
//!    `emergency_alert` to nearby users and to contacts who are users.
//!
//! Notification failures are logged and counted, never returned.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinSet;
use utoipa::ToSchema;

use super::proximity::{DEFAULT_NEARBY_RADIUS_KM, NearbyUser, ProximityEngine};
use super::user_locks::UserLocks;
use crate::domain::{
    AlertMethod, ContactId, EmergencyAlert, EmergencyAlertPayload, EmergencyContact,
    EmergencySession, EventBus, GeoPoint, LocationPing, LocationStore, RecipientType, ServerEvent,
    SessionId, SessionStatus, TriggerMetadata, TriggerType, User, UserId,
};
use crate::error::SafeguardError;
use crate::notify::{Notifier, NotifyError};
use crate::persistence::{Store, TriggerCommit};

/// Default deadline for one contact's SMS hand-off.
pub const DEFAULT_NOTIFIER_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables of the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct EmergencySettings {
    /// Radius of the nearby-user fan-out.
    pub nearby_radius_km: f64,
    /// Deadline for each contact's SMS hand-off.
    pub notifier_timeout: Duration,
}

impl Default for EmergencySettings {
    fn default() -> Self {
        Self {
            nearby_radius_km: DEFAULT_NEARBY_RADIUS_KM,
            notifier_timeout: DEFAULT_NOTIFIER_TIMEOUT,
        }
    }
}

/// Input of [`EmergencyService::trigger`].
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    /// What fired the trigger.
    pub trigger_type: TriggerType,
    /// Where the user is, if known.
    pub location: Option<GeoPoint>,
    /// Matched phrase or transcript for voice triggers.
    pub phrase: Option<String>,
    /// Recogniser confidence for voice triggers.
    pub confidence: Option<f64>,
}

impl TriggerRequest {
    /// A manual trigger with an optional location.
    #[must_use]
    pub fn manual(location: Option<GeoPoint>) -> Self {
        Self {
            trigger_type: TriggerType::Manual,
            location,
            phrase: None,
            confidence: None,
        }
    }
}

/// Result of a successful trigger.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TriggerSummary {
    /// The new active session.
    pub session_id: SessionId,
    /// Contacts whose SMS was accepted before the deadline.
    pub contacts_notified: usize,
    /// Size of the contact list.
    pub contacts_total: usize,
    /// Nearby users an alert was recorded for.
    pub nearby_users_notified: usize,
    /// Live connections the `emergency_alert` event was queued on.
    pub realtime_recipients: usize,
    /// Trigger timestamp.
    pub triggered_at: chrono::DateTime<Utc>,
}

/// Read-only view of a user's emergency state.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EmergencyStatus {
    /// Whether an active session exists.
    pub active: bool,
    /// Snapshot of that session.
    pub session: Option<EmergencySession>,
}

/// The emergency state machine.
#[derive(Debug, Clone)]
pub struct EmergencyService {
    store: Arc<dyn Store>,
    locations: Arc<LocationStore>,
    proximity: ProximityEngine,
    notifier: Arc<dyn Notifier>,
    events: EventBus,
    locks: Arc<UserLocks>,
    settings: EmergencySettings,
}

impl EmergencyService {
    /// Wires the orchestrator to its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        locations: Arc<LocationStore>,
        proximity: ProximityEngine,
        notifier: Arc<dyn Notifier>,
        events: EventBus,
        settings: EmergencySettings,
    ) -> Self {
        Self {
            store,
            locations,
            proximity,
            notifier,
            events,
            locks: Arc::new(UserLocks::new()),
            settings,
        }
    }

    /// The per-user lock map shared by trigger, dismiss and resolve.
    #[must_use]
    pub fn locks(&self) -> &Arc<UserLocks> {
        &self.locks
    }

    /// Raises an emergency for `user_id`.
    ///
    /// # Errors
    ///
    /// - [`SafeguardError::InvalidCoordinate`] / [`SafeguardError::InvalidRequest`]
    ///   for a malformed location or confidence.
    /// - [`SafeguardError::UserNotFound`] for an unknown user.
    /// - [`SafeguardError::DuplicateActiveSession`] if one is already active.
    /// - [`SafeguardError::PersistenceError`] if the commit fails; nothing
    ///   was written or sent in that case.
    pub async fn trigger(
        &self,
        user_id: UserId,
        request: TriggerRequest,
    ) -> Result<TriggerSummary, SafeguardError> {
        let coordinate = request
            .location
            .as_ref()
            .map(GeoPoint::coordinate)
            .transpose()?;
        if let Some(confidence) = request.confidence
            && !(0.0..=1.0).contains(&confidence)
        {
            return Err(SafeguardError::InvalidRequest(format!(
                "confidence must be within [0, 1], got {confidence}"
            )));
        }

        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(SafeguardError::UserNotFound(user_id))?;

        let guard = self.locks.lock(user_id).await;

        if let Some(existing) = self.store.find_active_session(user_id).await? {
            return Err(SafeguardError::DuplicateActiveSession {
                session_id: existing.id,
            });
        }

        let metadata = request.phrase.map(|phrase| TriggerMetadata {
            phrase,
            confidence: request.confidence,
        });
        let session = EmergencySession::open(
            user_id,
            request.trigger_type,
            request.location,
            metadata,
        );

        let contacts = self.store.list_contacts(user_id).await?;
        let nearby = match coordinate {
            Some(origin) => {
                self.proximity
                    .find_nearby(user_id, origin, self.settings.nearby_radius_km)
                    .await?
            }
            None => Vec::new(),
        };

        let ping = coordinate.map(|c| {
            LocationPing::at(
                user_id,
                c,
                request.location.and_then(|l| l.accuracy),
                true,
                session.triggered_at,
            )
        });
        let commit = TriggerCommit {
            alerts: build_alerts(session.id, &contacts, &nearby),
            session,
            ping,
        };
        self.store.commit_trigger(&commit).await?;
        drop(guard);

        let session = commit.session;
        if let Some(ping) = commit.ping {
            self.locations.insert(ping).await;
        }
        tracing::info!(
            %user_id,
            session_id = %session.id,
            trigger_type = %session.trigger_type,
            contacts = contacts.len(),
            nearby = nearby.len(),
            "emergency triggered"
        );

        let map_link = coordinate.map(|c| c.map_link());
        let contacts_notified = self
            .notify_contacts(&user, &session, &contacts, map_link)
            .await;
        let realtime_recipients = self
            .publish_alert(&user, &session, &contacts, &nearby)
            .await;

        Ok(TriggerSummary {
            session_id: session.id,
            contacts_notified,
            contacts_total: contacts.len(),
            nearby_users_notified: nearby.len(),
            realtime_recipients,
            triggered_at: session.triggered_at,
        })
    }

    /// Calls off the caller's active session and broadcasts
    /// `emergency_dismissed`.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::SessionNotFound`] if `session_id` is not an
    /// active session owned by `user_id`; nothing changes in that case.
    pub async fn dismiss(
        &self,
        user_id: UserId,
        session_id: SessionId,
        reason: Option<String>,
    ) -> Result<EmergencySession, SafeguardError> {
        let session = self
            .close(user_id, session_id, SessionStatus::Dismissed)
            .await?;
        let dismissed_at = session.resolved_at.unwrap_or_else(Utc::now);
        let delivered = self
            .events
            .broadcast(ServerEvent::EmergencyDismissed {
                session_id,
                user_id,
                reason,
                dismissed_at,
            })
            .await;
        tracing::info!(%user_id, %session_id, delivered, "emergency dismissed");
        Ok(session)
    }

    /// Marks the caller's active session as handled and broadcasts
    /// `emergency_resolved`.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::SessionNotFound`] under the same rules as
    /// [`EmergencyService::dismiss`].
    pub async fn resolve(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<EmergencySession, SafeguardError> {
        let session = self
            .close(user_id, session_id, SessionStatus::Resolved)
            .await?;
        let resolved_at = session.resolved_at.unwrap_or_else(Utc::now);
        let delivered = self
            .events
            .broadcast(ServerEvent::EmergencyResolved {
                session_id,
                user_id,
                resolved_at,
            })
            .await;
        tracing::info!(%user_id, %session_id, delivered, "emergency resolved");
        Ok(session)
    }

    /// Whether `user_id` has an active session, and its snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    pub async fn status(&self, user_id: UserId) -> Result<EmergencyStatus, SafeguardError> {
        let session = self.store.find_active_session(user_id).await?;
        Ok(EmergencyStatus {
            active: session.is_some(),
            session,
        })
    }

    /// The caller's latest `limit` sessions, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    pub async fn history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<EmergencySession>, SafeguardError> {
        self.store.session_history(user_id, limit).await
    }

    /// Alerts recorded for one of the caller's sessions.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::SessionNotFound`] if the session is not the
    /// caller's.
    pub async fn alerts(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Vec<EmergencyAlert>, SafeguardError> {
        self.store.list_alerts(user_id, session_id).await
    }

    async fn close(
        &self,
        user_id: UserId,
        session_id: SessionId,
        status: SessionStatus,
    ) -> Result<EmergencySession, SafeguardError> {
        let _guard = self.locks.lock(user_id).await;
        self.store
            .close_session(user_id, session_id, status, Utc::now())
            .await
    }

    async fn notify_contacts(
        &self,
        user: &User,
        session: &EmergencySession,
        contacts: &[EmergencyContact],
        map_link: Option<String>,
    ) -> usize {
        let message = format!(
            "EMERGENCY: {} has triggered a {} emergency alert and may need help.",
            user.name, session.trigger_type
        );
        let deadline = self.settings.notifier_timeout;

        let mut tasks: JoinSet<(ContactId, Result<(), NotifyError>)> = JoinSet::new();
        for contact in contacts {
            if contact.phone.trim().is_empty() {
                tracing::debug!(contact_id = %contact.id, "contact has no phone, skipping sms");
                continue;
            }
            let notifier = Arc::clone(&self.notifier);
            let contact_id = contact.id;
            let phone = contact.phone.clone();
            let message = message.clone();
            let map_link = map_link.clone();
            tasks.spawn(async move {
                let sent = notifier.send_sms(&phone, &message, map_link.as_deref());
                let outcome = match tokio::time::timeout(deadline, sent).await {
                    Ok(result) => result.map(|_| ()),
                    Err(_) => Err(NotifyError::Timeout),
                };
                (contact_id, outcome)
            });
        }

        let mut delivered = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => delivered += 1,
                Ok((contact_id, Err(e))) => {
                    tracing::warn!(
                        session_id = %session.id,
                        %contact_id,
                        error = %e,
                        "contact notification failed"
                    );
                }
                Err(e) => {
                    tracing::warn!(session_id = %session.id, error = %e, "notification task aborted");
                }
            }
        }
        delivered
    }

    async fn publish_alert(
        &self,
        user: &User,
        session: &EmergencySession,
        contacts: &[EmergencyContact],
        nearby: &[NearbyUser],
    ) -> usize {
        let phones: Vec<String> = contacts
            .iter()
            .map(|c| c.phone.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let contact_users = if phones.is_empty() {
            Vec::new()
        } else {
            match self.store.find_users_by_phone(&phones).await {
                Ok(users) => users,
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.id,
                        error = %e,
                        "could not resolve contacts to users"
                    );
                    Vec::new()
                }
            }
        };

        let recipients: Vec<UserId> = nearby
            .iter()
            .map(|n| n.user_id)
            .chain(contact_users.iter().map(|u| u.id))
            .filter(|id| *id != user.id)
            .collect();

        let event = ServerEvent::EmergencyAlert(EmergencyAlertPayload {
            session_id: session.id,
            user: user.public_profile(),
            location: session.location,
            trigger_type: session.trigger_type,
            timestamp: session.triggered_at,
        });
        self.events.publish_to_many(&recipients, &event).await
    }
}

fn build_alerts(
    session_id: SessionId,
    contacts: &[EmergencyContact],
    nearby: &[NearbyUser],
) -> Vec<EmergencyAlert> {
    let contact_alerts = contacts.iter().map(|c| {
        EmergencyAlert::new(
            session_id,
            RecipientType::Contact,
            c.id.to_string(),
            AlertMethod::Sms,
        )
    });
    let nearby_alerts = nearby.iter().map(|n| {
        EmergencyAlert::new(
            session_id,
            RecipientType::NearbyUser,
            n.user_id.to_string(),
            AlertMethod::Push,
        )
    });
    contact_alerts
        .chain(nearby_alerts)
        .chain(std::iter::once(EmergencyAlert::police(session_id)))
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::{ConnectionId, Coordinate, SessionRegistry};
    use crate::notify::{DeliveryReceipt, LogNotifier};
    use crate::persistence::MemoryStore;

    #[derive(Debug, Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send_sms(
            &self,
            phone: &str,
            _message: &str,
            _map_link: Option<&str>,
        ) -> Result<DeliveryReceipt, NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if phone.starts_with("+0") {
                Err(NotifyError::Gateway("unreachable".into()))
            } else {
                Ok(DeliveryReceipt::now("ok"))
            }
        }
    }

    #[derive(Debug)]
    struct HangingNotifier;

    #[async_trait]
    impl Notifier for HangingNotifier {
        async fn send_sms(
            &self,
            _phone: &str,
            _message: &str,
            _map_link: Option<&str>,
        ) -> Result<DeliveryReceipt, NotifyError> {
            std::future::pending().await
        }
    }

    struct Harness {
        service: EmergencyService,
        store: Arc<MemoryStore>,
        locations: Arc<LocationStore>,
        registry: Arc<SessionRegistry>,
    }

    fn harness_with(notifier: Arc<dyn Notifier>, timeout: Duration) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;
        let locations = Arc::new(LocationStore::new());
        let registry = Arc::new(SessionRegistry::new());
        let proximity = ProximityEngine::new(
            Arc::clone(&locations),
            Arc::clone(&dyn_store),
            ChronoDuration::minutes(5),
        );
        let service = EmergencyService::new(
            dyn_store,
            Arc::clone(&locations),
            proximity,
            notifier,
            EventBus::new(Arc::clone(&registry)),
            EmergencySettings {
                nearby_radius_km: 3.0,
                notifier_timeout: timeout,
            },
        );
        Harness {
            service,
            store,
            locations,
            registry,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(LogNotifier), DEFAULT_NOTIFIER_TIMEOUT)
    }

    async fn register(store: &MemoryStore, email: &str, phone: Option<&str>) -> User {
        let Ok(user) = store.upsert_user_by_email(email, email, phone).await else {
            panic!("upsert failed");
        };
        user
    }

    async fn add_contact(store: &MemoryStore, owner: UserId, phone: &str) -> EmergencyContact {
        let contact = EmergencyContact {
            id: ContactId::new(),
            user_id: owner,
            name: "Contact".to_string(),
            phone: phone.to_string(),
            relationship: None,
            priority_order: 1,
            created_at: Utc::now(),
        };
        let _ = store.add_contact(&contact).await;
        contact
    }

    async fn connect(registry: &SessionRegistry, user: UserId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(16);
        registry.bind(ConnectionId::new(), user, tx).await;
        rx
    }

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
            accuracy: None,
        }
    }

    #[tokio::test]
    async fn contact_who_is_a_user_receives_realtime_alert() {
        let h = harness();
        let a = register(&h.store, "a@example.com", Some("+15550001")).await;
        let b = register(&h.store, "b@example.com", Some("+15550002")).await;
        let contact = add_contact(&h.store, a.id, "+15550002").await;

        // B is online and ~500 m from A.
        let Ok(b_pos) = Coordinate::new(12.9755, 77.5946) else {
            panic!("valid coordinate");
        };
        h.locations.insert(LocationPing::new(b.id, b_pos, None, false)).await;
        let mut b_rx = connect(&h.registry, b.id).await;

        let Ok(summary) = h
            .service
            .trigger(a.id, TriggerRequest::manual(Some(point(12.9716, 77.5946))))
            .await
        else {
            panic!("trigger should succeed");
        };
        assert_eq!(summary.contacts_total, 1);
        assert_eq!(summary.contacts_notified, 1);
        assert_eq!(summary.nearby_users_notified, 1);
        // Nearby and contact match collapse into one delivery.
        assert_eq!(summary.realtime_recipients, 1);

        let Ok(alerts) = h.service.alerts(a.id, summary.session_id).await else {
            panic!("alerts should be listed");
        };
        let contact_alerts: Vec<&EmergencyAlert> = alerts
            .iter()
            .filter(|al| al.recipient_type == RecipientType::Contact)
            .collect();
        assert_eq!(contact_alerts.len(), 1);
        assert!(contact_alerts
            .iter()
            .all(|al| al.recipient_id == contact.id.to_string() && al.alert_method == AlertMethod::Sms));
        assert_eq!(
            alerts
                .iter()
                .filter(|al| al.recipient_type == RecipientType::Police)
                .count(),
            1
        );

        let Some(ServerEvent::EmergencyAlert(payload)) = b_rx.recv().await else {
            panic!("B should receive emergency_alert");
        };
        assert_eq!(payload.session_id, summary.session_id);
        assert_eq!(payload.user.id, a.id);
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn contact_user_far_away_still_gets_alert() {
        let h = harness();
        let a = register(&h.store, "a@example.com", None).await;
        let c = register(&h.store, "c@example.com", Some("+15550003")).await;
        add_contact(&h.store, a.id, "+15550003").await;
        let mut c_rx = connect(&h.registry, c.id).await;

        let Ok(summary) = h.service.trigger(a.id, TriggerRequest::manual(None)).await else {
            panic!("trigger should succeed");
        };
        assert_eq!(summary.nearby_users_notified, 0);
        assert_eq!(summary.realtime_recipients, 1);
        assert!(matches!(
            c_rx.recv().await,
            Some(ServerEvent::EmergencyAlert(_))
        ));
    }

    #[tokio::test]
    async fn origin_user_is_never_alerted() {
        let h = harness();
        let a = register(&h.store, "a@example.com", Some("+15550001")).await;
        // A lists their own number.
        add_contact(&h.store, a.id, "+15550001").await;
        let mut a_rx = connect(&h.registry, a.id).await;

        let Ok(summary) = h.service.trigger(a.id, TriggerRequest::manual(None)).await else {
            panic!("trigger should succeed");
        };
        assert_eq!(summary.realtime_recipients, 0);
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn second_trigger_is_rejected_until_dismissed() {
        let h = harness();
        let a = register(&h.store, "a@example.com", None).await;

        let Ok(first) = h.service.trigger(a.id, TriggerRequest::manual(None)).await else {
            panic!("first trigger should succeed");
        };
        let Err(SafeguardError::DuplicateActiveSession { session_id }) =
            h.service.trigger(a.id, TriggerRequest::manual(None)).await
        else {
            panic!("second trigger must be rejected");
        };
        assert_eq!(session_id, first.session_id);

        let Ok(dismissed) = h.service.dismiss(a.id, first.session_id, None).await else {
            panic!("dismiss should succeed");
        };
        assert_eq!(dismissed.status, SessionStatus::Dismissed);
        assert!(h.service.trigger(a.id, TriggerRequest::manual(None)).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_triggers_create_exactly_one_session() {
        let h = harness();
        let a = register(&h.store, "a@example.com", None).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = h.service.clone();
            handles.push(tokio::spawn(async move {
                service.trigger(a.id, TriggerRequest::manual(None)).await
            }));
        }
        let mut ok = 0;
        for handle in handles {
            if let Ok(Ok(_)) = handle.await {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(h.store.session_count().await, 1);
    }

    #[tokio::test]
    async fn dismiss_unknown_or_finished_session_is_not_found() {
        let h = harness();
        let a = register(&h.store, "a@example.com", None).await;

        let unknown = h.service.dismiss(a.id, SessionId::new(), None).await;
        assert!(matches!(unknown, Err(SafeguardError::SessionNotFound(_))));

        let Ok(summary) = h.service.trigger(a.id, TriggerRequest::manual(None)).await else {
            panic!("trigger should succeed");
        };
        let _ = h.service.dismiss(a.id, summary.session_id, None).await;
        let again = h.service.dismiss(a.id, summary.session_id, None).await;
        assert!(matches!(again, Err(SafeguardError::SessionNotFound(_))));

        let Ok(history) = h.service.history(a.id, 10).await else {
            panic!("history should load");
        };
        assert!(history.iter().all(|s| s.status == SessionStatus::Dismissed));
    }

    #[tokio::test]
    async fn someone_else_cannot_dismiss() {
        let h = harness();
        let a = register(&h.store, "a@example.com", None).await;
        let b = register(&h.store, "b@example.com", None).await;
        let Ok(summary) = h.service.trigger(a.id, TriggerRequest::manual(None)).await else {
            panic!("trigger should succeed");
        };
        let result = h.service.dismiss(b.id, summary.session_id, None).await;
        assert!(matches!(result, Err(SafeguardError::SessionNotFound(_))));
        let Ok(status) = h.service.status(a.id).await else {
            panic!("status should load");
        };
        assert!(status.active);
    }

    #[tokio::test]
    async fn dismiss_broadcasts_to_everyone() {
        let h = harness();
        let a = register(&h.store, "a@example.com", None).await;
        let stranger = register(&h.store, "s@example.com", None).await;
        let mut rx = connect(&h.registry, stranger.id).await;

        let Ok(summary) = h.service.trigger(a.id, TriggerRequest::manual(None)).await else {
            panic!("trigger should succeed");
        };
        let _ = h
            .service
            .dismiss(a.id, summary.session_id, Some("false alarm".into()))
            .await;

        let Some(ServerEvent::EmergencyDismissed { reason, .. }) = rx.recv().await else {
            panic!("expected emergency_dismissed");
        };
        assert_eq!(reason.as_deref(), Some("false alarm"));
    }

    #[tokio::test]
    async fn resolve_is_terminal() {
        let h = harness();
        let a = register(&h.store, "a@example.com", None).await;
        let Ok(summary) = h.service.trigger(a.id, TriggerRequest::manual(None)).await else {
            panic!("trigger should succeed");
        };
        let Ok(resolved) = h.service.resolve(a.id, summary.session_id).await else {
            panic!("resolve should succeed");
        };
        assert_eq!(resolved.status, SessionStatus::Resolved);
        assert!(matches!(
            h.service.dismiss(a.id, summary.session_id, None).await,
            Err(SafeguardError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn notifier_failures_are_counted_not_raised() {
        let notifier = Arc::new(CountingNotifier::default());
        let h = harness_with(
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            DEFAULT_NOTIFIER_TIMEOUT,
        );
        let a = register(&h.store, "a@example.com", None).await;
        add_contact(&h.store, a.id, "+15550100").await;
        add_contact(&h.store, a.id, "+0000").await;
        add_contact(&h.store, a.id, "").await;

        let Ok(summary) = h.service.trigger(a.id, TriggerRequest::manual(None)).await else {
            panic!("trigger should succeed despite notifier failure");
        };
        assert_eq!(summary.contacts_total, 3);
        assert_eq!(summary.contacts_notified, 1);
        // The blank phone is never dialled.
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn hanging_notifier_is_cut_off() {
        let h = harness_with(Arc::new(HangingNotifier), Duration::from_millis(50));
        let a = register(&h.store, "a@example.com", None).await;
        add_contact(&h.store, a.id, "+15550100").await;

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            h.service.trigger(a.id, TriggerRequest::manual(None)),
        )
        .await;
        let Ok(Ok(summary)) = result else {
            panic!("trigger must finish despite a hanging notifier");
        };
        assert_eq!(summary.contacts_notified, 0);
    }

    #[tokio::test]
    async fn emergency_ping_is_stored_and_indexed() {
        let h = harness();
        let a = register(&h.store, "a@example.com", None).await;
        let Ok(_) = h
            .service
            .trigger(a.id, TriggerRequest::manual(Some(point(10.0, 20.0))))
            .await
        else {
            panic!("trigger should succeed");
        };
        assert_eq!(h.store.ping_count().await, 1);
        let recent = h.locations.recent_pings(Utc::now() - ChronoDuration::minutes(1)).await;
        assert!(recent.iter().any(|p| p.user_id == a.id && p.is_emergency));
    }

    #[tokio::test]
    async fn invalid_location_writes_nothing() {
        let h = harness();
        let a = register(&h.store, "a@example.com", None).await;
        let result = h
            .service
            .trigger(a.id, TriggerRequest::manual(Some(point(100.0, 0.0))))
            .await;
        assert!(matches!(result, Err(SafeguardError::InvalidCoordinate { .. })));
        assert_eq!(h.store.session_count().await, 0);
    }

    #[tokio::test]
    async fn voice_trigger_keeps_metadata() {
        let h = harness();
        let a = register(&h.store, "a@example.com", None).await;
        let request = TriggerRequest {
            trigger_type: TriggerType::Voice,
            location: None,
            phrase: Some("help me".into()),
            confidence: Some(0.8),
        };
        let Ok(_) = h.service.trigger(a.id, request).await else {
            panic!("trigger should succeed");
        };
        let Ok(EmergencyStatus {
            session: Some(session),
            ..
        }) = h.service.status(a.id).await
        else {
            panic!("active session expected");
        };
        assert_eq!(session.trigger_type, TriggerType::Voice);
        assert_eq!(
            session.metadata.map(|m| m.phrase).as_deref(),
            Some("help me")
        );
    }
}
