//! Accounts, emergency contacts, and trained voice phrases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ContactId, PhraseId, UserId};

/// A registered account.
///
/// Owned by the identity subsystem; the alerting core only reads it, apart
/// from the profile fields the owner may edit.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct User {
    /// Account identity.
    pub id: UserId,
    /// Login email, unique per account.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Contact phone, used to recognise this user as somebody's contact.
    pub phone: Option<String>,
    /// Free-form date of birth.
    pub date_of_birth: Option<String>,
    /// Free-form gender.
    pub gender: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Avatar URL.
    pub profile_picture: Option<String>,
    /// Inactive accounts are invisible to proximity search and cannot
    /// authenticate.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last profile change.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Builds a fresh, active account.
    #[must_use]
    pub fn new(email: String, name: String, phone: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            email,
            name,
            phone,
            date_of_birth: None,
            gender: None,
            address: None,
            profile_picture: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// The subset of the profile shared with alert recipients.
    #[must_use]
    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            name: self.name.clone(),
            phone: self.phone.clone(),
        }
    }

    /// Applies a partial profile update and bumps `updated_at`.
    pub fn apply(&mut self, update: ProfileUpdate) {
        let ProfileUpdate {
            name,
            phone,
            date_of_birth,
            gender,
            address,
        } = update;
        if let Some(name) = name {
            self.name = name;
        }
        if phone.is_some() {
            self.phone = phone;
        }
        if date_of_birth.is_some() {
            self.date_of_birth = date_of_birth;
        }
        if gender.is_some() {
            self.gender = gender;
        }
        if address.is_some() {
            self.address = address;
        }
        self.updated_at = Utc::now();
    }
}

/// Public identity attached to emergency broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PublicProfile {
    /// User identity.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Phone number, if the user shared one.
    pub phone: Option<String>,
}

/// Editable profile fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// New date of birth.
    #[serde(default)]
    pub date_of_birth: Option<String>,
    /// New gender.
    #[serde(default)]
    pub gender: Option<String>,
    /// New address.
    #[serde(default)]
    pub address: Option<String>,
}

/// Someone to text when the owner triggers an emergency.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EmergencyContact {
    /// Contact identity.
    pub id: ContactId,
    /// Owning user.
    pub user_id: UserId,
    /// Contact name.
    pub name: String,
    /// Phone number the SMS goes to.
    pub phone: String,
    /// Free-form relationship label (e.g. "sister").
    pub relationship: Option<String>,
    /// Dispatch order, lowest first.
    pub priority_order: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Default dispatch priority for contacts created without one.
pub const DEFAULT_CONTACT_PRIORITY: i32 = 1;

/// A trained trigger phrase.
///
/// At most one phrase per user has `is_active = true`; training a new one
/// deactivates the rest, leaving them as history.
#[derive(Debug, Clone, PartialEq)]
pub struct VoicePhrase {
    /// Phrase identity.
    pub id: PhraseId,
    /// Owning user.
    pub user_id: UserId,
    /// Normalized phrase text (lowercase, trimmed).
    pub phrase: String,
    /// Argon2id PHC hash of the password that gates phrase changes.
    pub password_hash: String,
    /// Whether this is the phrase currently matched against transcripts.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Lowercases and trims phrase or transcript text.
#[must_use]
pub fn normalize_phrase(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn apply_updates_only_given_fields() {
        let mut user = User::new("a@example.com".into(), "Asha".into(), Some("111".into()));
        user.apply(ProfileUpdate {
            name: Some("Asha K".into()),
            address: Some("12 Park Road".into()),
            ..ProfileUpdate::default()
        });
        assert_eq!(user.name, "Asha K");
        assert_eq!(user.phone.as_deref(), Some("111"));
        assert_eq!(user.address.as_deref(), Some("12 Park Road"));
        assert!(user.updated_at >= user.created_at);
    }

    #[test]
    fn public_profile_hides_email() {
        let user = User::new("a@example.com".into(), "Asha".into(), None);
        let Ok(json) = serde_json::to_string(&user.public_profile()) else {
            panic!("serialization failed");
        };
        assert!(!json.contains("a@example.com"));
        assert!(json.contains("Asha"));
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_phrase("  Help ME  "), "help me");
    }
}
