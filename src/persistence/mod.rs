//! Persistence layer: the narrow durable-storage interface of the alerting
//! core and its two implementations.
//!
//! Services depend on `Arc<dyn Store>` only. [`MemoryStore`] keeps
//! everything in process and is the default without a database;
//! [`PostgresStore`] maps the same operations onto PostgreSQL through
//! `sqlx`.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::domain::{
    ContactId, EmergencyAlert, EmergencyContact, EmergencySession, LocationPing, ProfileUpdate,
    SessionId, SessionStatus, User, UserId, VoicePhrase,
};
use crate::error::SafeguardError;

/// Everything an emergency trigger writes, committed as one unit.
///
/// Either all of it becomes visible or none of it does.
#[derive(Debug, Clone)]
pub struct TriggerCommit {
    /// The new active session.
    pub session: EmergencySession,
    /// The emergency ping, when the trigger carried a location.
    pub ping: Option<LocationPing>,
    /// Contact, nearby-user and police alerts.
    pub alerts: Vec<EmergencyAlert>,
}

/// Durable storage for users, contacts, pings, sessions, alerts and voice
/// phrases.
#[async_trait]
pub trait Store: std::fmt::Debug + Send + Sync {
    /// Looks up one user.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, SafeguardError>;

    /// Looks up several users; unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, SafeguardError>;

    /// Returns the user registered under `email`, creating it if needed.
    /// An existing user keeps its profile; a given phone fills an empty one.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn upsert_user_by_email(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<User, SafeguardError>;

    /// Applies a partial profile update.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::UserNotFound`] for an unknown user.
    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
    ) -> Result<User, SafeguardError>;

    /// Active users whose phone is one of `phones`.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn find_users_by_phone(&self, phones: &[String]) -> Result<Vec<User>, SafeguardError>;

    /// Contacts of `user_id`, ordered by priority then creation time.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn list_contacts(&self, user_id: UserId)
    -> Result<Vec<EmergencyContact>, SafeguardError>;

    /// Stores a new contact.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn add_contact(&self, contact: &EmergencyContact) -> Result<(), SafeguardError>;

    /// Deletes a contact owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::ContactNotFound`] if no such contact is
    /// owned by the user.
    async fn remove_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<(), SafeguardError>;

    /// Appends one ping to the durable location history.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn append_ping(&self, ping: &LocationPing) -> Result<(), SafeguardError>;

    /// Every ping with `timestamp >= since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn query_pings_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<LocationPing>, SafeguardError>;

    /// The latest `limit` pings of one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn location_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<LocationPing>, SafeguardError>;

    /// The user's active session, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn find_active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<EmergencySession>, SafeguardError>;

    /// Writes a trigger's session, ping and alerts atomically.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::DuplicateActiveSession`] if the user already
    /// has an active session; nothing is written in that case.
    async fn commit_trigger(&self, commit: &TriggerCommit) -> Result<(), SafeguardError>;

    /// Moves an active session owned by `user_id` to the terminal `status`.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::SessionNotFound`] when the session does not
    /// exist, belongs to someone else, or is no longer active.
    async fn close_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<EmergencySession, SafeguardError>;

    /// The latest `limit` sessions of one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn session_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<EmergencySession>, SafeguardError>;

    /// Alerts of a session owned by `user_id`, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::SessionNotFound`] when the session does not
    /// exist or belongs to someone else.
    async fn list_alerts(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Vec<EmergencyAlert>, SafeguardError>;

    /// The user's active voice phrase, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn active_phrase(&self, user_id: UserId)
    -> Result<Option<VoicePhrase>, SafeguardError>;

    /// Stores `phrase` as the user's only active phrase, deactivating any
    /// other in the same step.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    async fn insert_phrase_exclusive(&self, phrase: &VoicePhrase) -> Result<(), SafeguardError>;
}
