//! Identity exchange, profiles and emergency contacts.

use std::sync::Arc;

use chrono::Utc;

use crate::auth::TokenIssuer;
use crate::domain::{
    ContactId, DEFAULT_CONTACT_PRIORITY, EmergencyContact, ProfileUpdate, User, UserId,
};
use crate::error::SafeguardError;
use crate::persistence::Store;

/// A new emergency contact as submitted by the owner.
#[derive(Debug, Clone)]
pub struct NewContact {
    /// Display name.
    pub name: String,
    /// Phone number texted on trigger.
    pub phone: String,
    /// Free-form relationship label.
    pub relationship: Option<String>,
    /// Notification priority; lower goes first.
    pub priority_order: Option<i32>,
}

/// A signed-in user and the bearer token issued for them.
#[derive(Debug, Clone)]
pub struct Session {
    /// The account.
    pub user: User,
    /// Bearer token for REST and WebSocket authentication.
    pub token: String,
}

/// Accounts and their contacts.
#[derive(Debug, Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
    tokens: Arc<dyn TokenIssuer>,
}

impl UserService {
    /// Creates the service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, tokens: Arc<dyn TokenIssuer>) -> Self {
        Self { store, tokens }
    }

    /// Exchanges a verified identity for a session, registering the user
    /// on first sight.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidRequest`] for a malformed email or
    /// blank name, and [`SafeguardError::Unauthenticated`] for a
    /// deactivated account.
    pub async fn sign_in(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<Session, SafeguardError> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(SafeguardError::InvalidRequest(format!(
                "invalid email address: {email}"
            )));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(SafeguardError::InvalidRequest(
                "name must not be blank".to_string(),
            ));
        }
        let phone = phone.map(str::trim).filter(|p| !p.is_empty());

        let user = self.store.upsert_user_by_email(&email, name, phone).await?;
        if !user.active {
            return Err(SafeguardError::Unauthenticated(
                "account is deactivated".to_string(),
            ));
        }
        let token = self.tokens.issue(user.id)?;
        tracing::info!(user_id = %user.id, "user signed in");
        Ok(Session { user, token })
    }

    /// Issues a fresh token for an already authenticated user.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::Internal`] if signing fails.
    pub fn refresh(&self, user_id: UserId) -> Result<String, SafeguardError> {
        self.tokens.issue(user_id)
    }

    /// Resolves a bearer token to an active user.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::Unauthenticated`] for a bad or expired
    /// token, an unknown user, or a deactivated account.
    pub async fn authenticate(&self, token: &str) -> Result<User, SafeguardError> {
        let Some(user_id) = self.tokens.verify(token) else {
            return Err(SafeguardError::Unauthenticated(
                "invalid or expired token".to_string(),
            ));
        };
        match self.store.get_user(user_id).await? {
            Some(user) if user.active => Ok(user),
            _ => Err(SafeguardError::Unauthenticated(
                "unknown or inactive user".to_string(),
            )),
        }
    }

    /// The caller's profile.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::UserNotFound`] for an unknown user.
    pub async fn profile(&self, user_id: UserId) -> Result<User, SafeguardError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(SafeguardError::UserNotFound(user_id))
    }

    /// Applies a partial profile update.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidRequest`] for a blank name and
    /// [`SafeguardError::UserNotFound`] for an unknown user.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        mut update: ProfileUpdate,
    ) -> Result<User, SafeguardError> {
        if let Some(name) = update.name.as_mut() {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(SafeguardError::InvalidRequest(
                    "name must not be blank".to_string(),
                ));
            }
            *name = trimmed.to_string();
        }
        self.store.update_profile(user_id, update).await
    }

    /// The caller's contacts in notification order.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    pub async fn contacts(&self, user_id: UserId) -> Result<Vec<EmergencyContact>, SafeguardError> {
        self.store.list_contacts(user_id).await
    }

    /// Adds a contact. Priority defaults to [`DEFAULT_CONTACT_PRIORITY`].
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidRequest`] for a blank name or phone.
    pub async fn add_contact(
        &self,
        user_id: UserId,
        contact: NewContact,
    ) -> Result<EmergencyContact, SafeguardError> {
        let name = contact.name.trim();
        let phone = contact.phone.trim();
        if name.is_empty() || phone.is_empty() {
            return Err(SafeguardError::InvalidRequest(
                "contact name and phone are required".to_string(),
            ));
        }
        let contact = EmergencyContact {
            id: ContactId::new(),
            user_id,
            name: name.to_string(),
            phone: phone.to_string(),
            relationship: contact.relationship.filter(|r| !r.trim().is_empty()),
            priority_order: contact.priority_order.unwrap_or(DEFAULT_CONTACT_PRIORITY),
            created_at: Utc::now(),
        };
        self.store.add_contact(&contact).await?;
        tracing::info!(%user_id, contact_id = %contact.id, "emergency contact added");
        Ok(contact)
    }

    /// Removes one of the caller's contacts.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::ContactNotFound`] if the contact does not
    /// exist or belongs to someone else.
    pub async fn remove_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<(), SafeguardError> {
        self.store.remove_contact(user_id, contact_id).await?;
        tracing::info!(%user_id, %contact_id, "emergency contact removed");
        Ok(())
    }
}
