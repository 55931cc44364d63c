//! Database row types and their conversion into domain types.
//!
//! Enum columns are stored as text; an unknown value in a row surfaces as
//! [`SafeguardError::PersistenceError`] rather than being silently coerced.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use crate::domain::{
    AlertId, ContactId, EmergencyAlert, EmergencyContact, EmergencySession, GeoPoint,
    LocationPing, PhraseId, PingId, SessionId, TriggerMetadata, User, UserId, VoicePhrase,
};
use crate::error::SafeguardError;

/// A row of the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    /// Primary key.
    pub id: Uuid,
    /// Unique login email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Phone number.
    pub phone: Option<String>,
    /// Date of birth.
    pub date_of_birth: Option<String>,
    /// Gender.
    pub gender: Option<String>,
    /// Address.
    pub address: Option<String>,
    /// Avatar URL.
    pub profile_picture: Option<String>,
    /// Account enabled flag.
    pub is_active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_uuid(row.id),
            email: row.email,
            name: row.name,
            phone: row.phone,
            date_of_birth: row.date_of_birth,
            gender: row.gender,
            address: row.address,
            profile_picture: row.profile_picture,
            active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A row of the `emergency_contacts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContactRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Contact name.
    pub name: String,
    /// Contact phone.
    pub phone: String,
    /// Relationship label.
    pub relationship: Option<String>,
    /// Dispatch priority.
    pub priority_order: i32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<ContactRow> for EmergencyContact {
    fn from(row: ContactRow) -> Self {
        Self {
            id: ContactId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            name: row.name,
            phone: row.phone,
            relationship: row.relationship,
            priority_order: row.priority_order,
            created_at: row.created_at,
        }
    }
}

/// A row of the `user_locations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PingRow {
    /// Primary key.
    pub id: Uuid,
    /// Who was here.
    pub user_id: Uuid,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Accuracy in metres.
    pub accuracy: Option<f64>,
    /// Ingestion time.
    pub timestamp: DateTime<Utc>,
    /// Emergency flag.
    pub is_emergency: bool,
}

impl From<PingRow> for LocationPing {
    fn from(row: PingRow) -> Self {
        Self {
            id: PingId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            latitude: row.latitude,
            longitude: row.longitude,
            accuracy: row.accuracy,
            timestamp: row.timestamp,
            is_emergency: row.is_emergency,
        }
    }
}

/// A row of the `emergency_sessions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    /// Primary key.
    pub id: Uuid,
    /// Session owner.
    pub user_id: Uuid,
    /// `voice`, `manual` or `automatic`.
    pub trigger_type: String,
    /// Trigger latitude.
    pub latitude: Option<f64>,
    /// Trigger longitude.
    pub longitude: Option<f64>,
    /// Trigger accuracy.
    pub accuracy: Option<f64>,
    /// `active`, `dismissed` or `resolved`.
    pub status: String,
    /// Trigger time.
    pub triggered_at: DateTime<Utc>,
    /// Terminal transition time.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Voice-trigger details.
    pub metadata: Option<Json<TriggerMetadata>>,
}

impl TryFrom<SessionRow> for EmergencySession {
    type Error = SafeguardError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
                accuracy: row.accuracy,
            }),
            _ => None,
        };
        Ok(Self {
            id: SessionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            trigger_type: row.trigger_type.parse()?,
            location,
            status: row.status.parse()?,
            triggered_at: row.triggered_at,
            resolved_at: row.resolved_at,
            metadata: row.metadata.map(|Json(m)| m),
        })
    }
}

/// A row of the `emergency_alerts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// `contact`, `nearby_user` or `police`.
    pub recipient_type: String,
    /// Recipient reference.
    pub recipient_id: String,
    /// `sms`, `push` or `system`.
    pub alert_method: String,
    /// `sent`, `delivered` or `failed`.
    pub status: String,
    /// Creation time.
    pub sent_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for EmergencyAlert {
    type Error = SafeguardError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: AlertId::from_uuid(row.id),
            session_id: SessionId::from_uuid(row.session_id),
            recipient_type: row.recipient_type.parse()?,
            recipient_id: row.recipient_id,
            alert_method: row.alert_method.parse()?,
            status: row.status.parse()?,
            sent_at: row.sent_at,
        })
    }
}

/// A row of the `voice_phrases` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PhraseRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Normalized phrase.
    pub phrase: String,
    /// Argon2id PHC hash.
    pub password_hash: String,
    /// Active flag.
    pub is_active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<PhraseRow> for VoicePhrase {
    fn from(row: PhraseRow) -> Self {
        Self {
            id: PhraseId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            phrase: row.phrase,
            password_hash: row.password_hash,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}
