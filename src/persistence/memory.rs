//! In-process [`Store`] used when no database is configured, and by tests.
//!
//! All tables live behind one [`tokio::sync::RwLock`], so every operation,
//! including a trigger commit, is atomic with respect to every other.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Store, TriggerCommit};
use crate::domain::{
    ContactId, EmergencyAlert, EmergencyContact, EmergencySession, LocationPing, ProfileUpdate,
    SessionId, SessionStatus, User, UserId, VoicePhrase,
};
use crate::error::SafeguardError;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    contacts: Vec<EmergencyContact>,
    pings: Vec<LocationPing>,
    sessions: Vec<EmergencySession>,
    alerts: Vec<EmergencyAlert>,
    phrases: Vec<VoicePhrase>,
}

/// Volatile store; everything is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user record as-is.
    pub async fn put_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    /// Flips a user's `active` flag. Returns `false` for an unknown user.
    pub async fn set_user_active(&self, id: UserId, active: bool) -> bool {
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&id) {
            Some(user) => {
                user.active = active;
                user.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Number of sessions ever stored, across all users.
    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }

    /// Number of durable pings stored, across all users.
    pub async fn ping_count(&self) -> usize {
        self.tables.read().await.pings.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, SafeguardError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, SafeguardError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.users.get(id).cloned())
            .collect())
    }

    async fn upsert_user_by_email(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<User, SafeguardError> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.values_mut().find(|u| u.email == email) {
            if user.phone.is_none()
                && let Some(phone) = phone
            {
                user.phone = Some(phone.to_string());
                user.updated_at = Utc::now();
            }
            return Ok(user.clone());
        }
        let user = User::new(email.to_string(), name.to_string(), phone.map(str::to_string));
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
    ) -> Result<User, SafeguardError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(SafeguardError::UserNotFound(id))?;
        user.apply(update);
        Ok(user.clone())
    }

    async fn find_users_by_phone(&self, phones: &[String]) -> Result<Vec<User>, SafeguardError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| u.active)
            .filter(|u| u.phone.as_ref().is_some_and(|p| phones.contains(p)))
            .cloned()
            .collect())
    }

    async fn list_contacts(
        &self,
        user_id: UserId,
    ) -> Result<Vec<EmergencyContact>, SafeguardError> {
        let tables = self.tables.read().await;
        let mut contacts: Vec<EmergencyContact> = tables
            .contacts
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        contacts.sort_by_key(|c| (c.priority_order, c.created_at));
        Ok(contacts)
    }

    async fn add_contact(&self, contact: &EmergencyContact) -> Result<(), SafeguardError> {
        self.tables.write().await.contacts.push(contact.clone());
        Ok(())
    }

    async fn remove_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<(), SafeguardError> {
        let mut tables = self.tables.write().await;
        let before = tables.contacts.len();
        tables
            .contacts
            .retain(|c| !(c.id == contact_id && c.user_id == user_id));
        if tables.contacts.len() == before {
            return Err(SafeguardError::ContactNotFound(contact_id));
        }
        Ok(())
    }

    async fn append_ping(&self, ping: &LocationPing) -> Result<(), SafeguardError> {
        self.tables.write().await.pings.push(*ping);
        Ok(())
    }

    async fn query_pings_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<LocationPing>, SafeguardError> {
        let tables = self.tables.read().await;
        let mut pings: Vec<LocationPing> = tables
            .pings
            .iter()
            .filter(|p| p.timestamp >= since)
            .copied()
            .collect();
        pings.sort_by_key(|p| p.timestamp);
        Ok(pings)
    }

    async fn location_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<LocationPing>, SafeguardError> {
        let tables = self.tables.read().await;
        let mut pings: Vec<LocationPing> = tables
            .pings
            .iter()
            .filter(|p| p.user_id == user_id)
            .copied()
            .collect();
        pings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        pings.truncate(limit);
        Ok(pings)
    }

    async fn find_active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<EmergencySession>, SafeguardError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .iter()
            .find(|s| s.user_id == user_id && s.status == SessionStatus::Active)
            .cloned())
    }

    async fn commit_trigger(&self, commit: &TriggerCommit) -> Result<(), SafeguardError> {
        let mut tables = self.tables.write().await;
        let user_id = commit.session.user_id;
        if let Some(existing) = tables
            .sessions
            .iter()
            .find(|s| s.user_id == user_id && s.status == SessionStatus::Active)
        {
            return Err(SafeguardError::DuplicateActiveSession {
                session_id: existing.id,
            });
        }
        tables.sessions.push(commit.session.clone());
        if let Some(ping) = commit.ping {
            tables.pings.push(ping);
        }
        tables.alerts.extend(commit.alerts.iter().cloned());
        Ok(())
    }

    async fn close_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<EmergencySession, SafeguardError> {
        let mut tables = self.tables.write().await;
        let session = tables
            .sessions
            .iter_mut()
            .find(|s| {
                s.id == session_id && s.user_id == user_id && s.status == SessionStatus::Active
            })
            .ok_or(SafeguardError::SessionNotFound(session_id))?;
        session.status = status;
        session.resolved_at = Some(at);
        Ok(session.clone())
    }

    async fn session_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<EmergencySession>, SafeguardError> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<EmergencySession> = tables
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn list_alerts(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Vec<EmergencyAlert>, SafeguardError> {
        let tables = self.tables.read().await;
        if !tables
            .sessions
            .iter()
            .any(|s| s.id == session_id && s.user_id == user_id)
        {
            return Err(SafeguardError::SessionNotFound(session_id));
        }
        Ok(tables
            .alerts
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn active_phrase(
        &self,
        user_id: UserId,
    ) -> Result<Option<VoicePhrase>, SafeguardError> {
        let tables = self.tables.read().await;
        Ok(tables
            .phrases
            .iter()
            .find(|p| p.user_id == user_id && p.is_active)
            .cloned())
    }

    async fn insert_phrase_exclusive(&self, phrase: &VoicePhrase) -> Result<(), SafeguardError> {
        let mut tables = self.tables.write().await;
        for existing in tables
            .phrases
            .iter_mut()
            .filter(|p| p.user_id == phrase.user_id)
        {
            existing.is_active = false;
        }
        let mut phrase = phrase.clone();
        phrase.is_active = true;
        tables.phrases.push(phrase);
        Ok(())
    }
}
