//! PostgreSQL implementation of [`Store`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use uuid::Uuid;

use super::models::{AlertRow, ContactRow, PhraseRow, PingRow, SessionRow, UserRow};
use super::{Store, TriggerCommit};
use crate::domain::{
    ContactId, EmergencyAlert, EmergencyContact, EmergencySession, LocationPing, ProfileUpdate,
    SessionId, SessionStatus, User, UserId, VoicePhrase,
};
use crate::error::SafeguardError;

const USER_COLUMNS: &str = "id, email, name, phone, date_of_birth, gender, address, \
                            profile_picture, is_active, created_at, updated_at";
const CONTACT_COLUMNS: &str = "id, user_id, name, phone, relationship, priority_order, created_at";
const PING_COLUMNS: &str = "id, user_id, latitude, longitude, accuracy, timestamp, is_emergency";
const SESSION_COLUMNS: &str = "id, user_id, trigger_type, latitude, longitude, accuracy, status, \
                               triggered_at, resolved_at, metadata";
const ALERT_COLUMNS: &str =
    "id, session_id, recipient_type, recipient_id, alert_method, status, sent_at";
const PHRASE_COLUMNS: &str = "id, user_id, phrase, password_hash, is_active, created_at";

/// PostgreSQL-backed [`Store`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] if the database cannot
    /// be reached.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, SafeguardError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies pending migrations from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), SafeguardError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SafeguardError::PersistenceError(format!("migration failed: {e}")))
    }

    async fn active_session_id(&self, user_id: UserId) -> Result<Option<Uuid>, SafeguardError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM emergency_sessions WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl Store for PostgresStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, SafeguardError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, SafeguardError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn upsert_user_by_email(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<User, SafeguardError> {
        let fresh = User::new(email.to_string(), name.to_string(), phone.map(str::to_string));
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, email, name, phone, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, TRUE, $5, $5) \
             ON CONFLICT (email) DO UPDATE SET phone = COALESCE(users.phone, EXCLUDED.phone) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(fresh.id.as_uuid())
        .bind(&fresh.email)
        .bind(&fresh.name)
        .bind(fresh.phone.as_deref())
        .bind(fresh.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
    ) -> Result<User, SafeguardError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                phone = COALESCE($3, phone), \
                date_of_birth = COALESCE($4, date_of_birth), \
                gender = COALESCE($5, gender), \
                address = COALESCE($6, address), \
                updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(update.name)
        .bind(update.phone)
        .bind(update.date_of_birth)
        .bind(update.gender)
        .bind(update.address)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::from).ok_or(SafeguardError::UserNotFound(id))
    }

    async fn find_users_by_phone(&self, phones: &[String]) -> Result<Vec<User>, SafeguardError> {
        if phones.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_active AND phone = ANY($1)"
        ))
        .bind(phones.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn list_contacts(
        &self,
        user_id: UserId,
    ) -> Result<Vec<EmergencyContact>, SafeguardError> {
        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM emergency_contacts WHERE user_id = $1 \
             ORDER BY priority_order ASC, created_at ASC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EmergencyContact::from).collect())
    }

    async fn add_contact(&self, contact: &EmergencyContact) -> Result<(), SafeguardError> {
        sqlx::query(
            "INSERT INTO emergency_contacts \
             (id, user_id, name, phone, relationship, priority_order, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(contact.id.as_uuid())
        .bind(contact.user_id.as_uuid())
        .bind(&contact.name)
        .bind(&contact.phone)
        .bind(contact.relationship.as_deref())
        .bind(contact.priority_order)
        .bind(contact.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<(), SafeguardError> {
        let result = sqlx::query("DELETE FROM emergency_contacts WHERE id = $1 AND user_id = $2")
            .bind(contact_id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SafeguardError::ContactNotFound(contact_id));
        }
        Ok(())
    }

    async fn append_ping(&self, ping: &LocationPing) -> Result<(), SafeguardError> {
        sqlx::query(
            "INSERT INTO user_locations \
             (id, user_id, latitude, longitude, accuracy, timestamp, is_emergency) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(ping.id.as_uuid())
        .bind(ping.user_id.as_uuid())
        .bind(ping.latitude)
        .bind(ping.longitude)
        .bind(ping.accuracy)
        .bind(ping.timestamp)
        .bind(ping.is_emergency)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_pings_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<LocationPing>, SafeguardError> {
        let rows = sqlx::query_as::<_, PingRow>(&format!(
            "SELECT {PING_COLUMNS} FROM user_locations WHERE timestamp >= $1 \
             ORDER BY timestamp ASC"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LocationPing::from).collect())
    }

    async fn location_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<LocationPing>, SafeguardError> {
        let rows = sqlx::query_as::<_, PingRow>(&format!(
            "SELECT {PING_COLUMNS} FROM user_locations WHERE user_id = $1 \
             ORDER BY timestamp DESC LIMIT $2"
        ))
        .bind(user_id.as_uuid())
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LocationPing::from).collect())
    }

    async fn find_active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<EmergencySession>, SafeguardError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM emergency_sessions \
             WHERE user_id = $1 AND status = 'active'"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(EmergencySession::try_from).transpose()
    }

    async fn commit_trigger(&self, commit: &TriggerCommit) -> Result<(), SafeguardError> {
        let session = &commit.session;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO emergency_sessions \
             (id, user_id, trigger_type, latitude, longitude, accuracy, status, triggered_at, \
              resolved_at, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(session.id.as_uuid())
        .bind(session.user_id.as_uuid())
        .bind(session.trigger_type.as_str())
        .bind(session.location.map(|l| l.latitude))
        .bind(session.location.map(|l| l.longitude))
        .bind(session.location.and_then(|l| l.accuracy))
        .bind(session.status.as_str())
        .bind(session.triggered_at)
        .bind(session.resolved_at)
        .bind(session.metadata.as_ref().map(Json))
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                drop(tx);
                let existing = self.active_session_id(session.user_id).await?;
                return Err(SafeguardError::DuplicateActiveSession {
                    session_id: SessionId::from_uuid(existing.unwrap_or(*session.id.as_uuid())),
                });
            }
            return Err(e.into());
        }

        if let Some(ping) = &commit.ping {
            sqlx::query(
                "INSERT INTO user_locations \
                 (id, user_id, latitude, longitude, accuracy, timestamp, is_emergency) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(ping.id.as_uuid())
            .bind(ping.user_id.as_uuid())
            .bind(ping.latitude)
            .bind(ping.longitude)
            .bind(ping.accuracy)
            .bind(ping.timestamp)
            .bind(ping.is_emergency)
            .execute(&mut *tx)
            .await?;
        }

        for alert in &commit.alerts {
            sqlx::query(
                "INSERT INTO emergency_alerts \
                 (id, session_id, recipient_type, recipient_id, alert_method, status, sent_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(alert.id.as_uuid())
            .bind(alert.session_id.as_uuid())
            .bind(alert.recipient_type.as_str())
            .bind(&alert.recipient_id)
            .bind(alert.alert_method.as_str())
            .bind(alert.status.as_str())
            .bind(alert.sent_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn close_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<EmergencySession, SafeguardError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "UPDATE emergency_sessions SET status = $3, resolved_at = $4 \
             WHERE id = $1 AND user_id = $2 AND status = 'active' \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(status.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(SafeguardError::SessionNotFound(session_id))?
            .try_into()
    }

    async fn session_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<EmergencySession>, SafeguardError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM emergency_sessions WHERE user_id = $1 \
             ORDER BY triggered_at DESC LIMIT $2"
        ))
        .bind(user_id.as_uuid())
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EmergencySession::try_from).collect()
    }

    async fn list_alerts(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Vec<EmergencyAlert>, SafeguardError> {
        let owned = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM emergency_sessions WHERE id = $1 AND user_id = $2)",
        )
        .bind(session_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        if !owned {
            return Err(SafeguardError::SessionNotFound(session_id));
        }

        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM emergency_alerts WHERE session_id = $1 \
             ORDER BY sent_at ASC"
        ))
        .bind(session_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EmergencyAlert::try_from).collect()
    }

    async fn active_phrase(
        &self,
        user_id: UserId,
    ) -> Result<Option<VoicePhrase>, SafeguardError> {
        let row = sqlx::query_as::<_, PhraseRow>(&format!(
            "SELECT {PHRASE_COLUMNS} FROM voice_phrases WHERE user_id = $1 AND is_active"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(VoicePhrase::from))
    }

    async fn insert_phrase_exclusive(&self, phrase: &VoicePhrase) -> Result<(), SafeguardError> {
        let mut tx = self.pool.begin().await?;
        // Row lock on the owner serializes concurrent writers across processes.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(phrase.user_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE voice_phrases SET is_active = FALSE WHERE user_id = $1 AND is_active")
            .bind(phrase.user_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO voice_phrases (id, user_id, phrase, password_hash, is_active, created_at) \
             VALUES ($1, $2, $3, $4, TRUE, $5)",
        )
        .bind(phrase.id.as_uuid())
        .bind(phrase.user_id.as_uuid())
        .bind(&phrase.phrase)
        .bind(&phrase.password_hash)
        .bind(phrase.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
