//! Trained voice phrases: training, matching and password-gated updates.
//!
//! Matching is intentionally naive: the normalized phrase must occur in the
//! normalized transcript and the recogniser must report at least
//! [`MATCH_CONFIDENCE_THRESHOLD`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{hash_password, verify_password};
use crate::domain::{PhraseId, UserId, VoicePhrase, normalize_phrase};
use crate::error::SafeguardError;
use crate::persistence::Store;

use super::user_locks::UserLocks;

/// Minimum recogniser confidence for a match.
pub const MATCH_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Outcome of matching a transcript against the active phrase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhraseVerification {
    /// The phrase was heard with enough confidence.
    Matched {
        /// The matched phrase.
        phrase_id: PhraseId,
        /// Confidence reported by the recogniser.
        confidence: f64,
    },
    /// Phrase absent from the transcript, or confidence too low.
    Mismatch,
    /// The user never trained a phrase.
    NoActivePhrase,
}

impl PhraseVerification {
    /// `true` for [`PhraseVerification::Matched`].
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Outcome of a password-gated phrase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseUpdateOutcome {
    /// The new phrase is now active.
    Updated {
        /// Id of the new phrase.
        phrase_id: PhraseId,
    },
    /// There is no phrase to update.
    NoActivePhrase,
    /// The old password did not verify.
    InvalidPassword,
}

/// Whether a user has a trained phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PhraseStatus {
    /// A phrase is active.
    pub has_phrase: bool,
    /// The active phrase text.
    pub phrase: Option<String>,
    /// When it was trained.
    pub created_at: Option<DateTime<Utc>>,
}

/// `true` iff the normalized `phrase` occurs in the normalized `transcript`
/// and `confidence` reaches the threshold.
#[must_use]
pub fn phrase_matches(phrase: &str, transcript: &str, confidence: f64) -> bool {
    let phrase = normalize_phrase(phrase);
    !phrase.is_empty()
        && confidence >= MATCH_CONFIDENCE_THRESHOLD
        && normalize_phrase(transcript).contains(&phrase)
}

/// Voice phrase lifecycle.
#[derive(Debug, Clone)]
pub struct VoiceService {
    store: Arc<dyn Store>,
    locks: Arc<UserLocks>,
}

impl VoiceService {
    /// Creates the service. Phrase writes for one user are serialized
    /// through `locks`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, locks: Arc<UserLocks>) -> Self {
        Self { store, locks }
    }

    /// Trains `phrase` as the user's only active phrase. Older phrases stay
    /// as inactive history.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidRequest`] for a blank phrase or
    /// password.
    pub async fn train(
        &self,
        user_id: UserId,
        phrase: &str,
        password: &str,
    ) -> Result<PhraseId, SafeguardError> {
        let phrase = Self::build(user_id, phrase, password)?;
        let _guard = self.locks.lock(user_id).await;
        self.store.insert_phrase_exclusive(&phrase).await?;
        tracing::info!(%user_id, phrase_id = %phrase.id, "voice phrase trained");
        Ok(phrase.id)
    }

    /// Matches a transcript against the active phrase.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidRequest`] for a confidence outside
    /// `[0, 1]`.
    pub async fn verify(
        &self,
        user_id: UserId,
        transcript: &str,
        confidence: f64,
    ) -> Result<PhraseVerification, SafeguardError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(SafeguardError::InvalidRequest(format!(
                "confidence must be within [0, 1], got {confidence}"
            )));
        }
        let Some(active) = self.store.active_phrase(user_id).await? else {
            return Ok(PhraseVerification::NoActivePhrase);
        };
        if phrase_matches(&active.phrase, transcript, confidence) {
            Ok(PhraseVerification::Matched {
                phrase_id: active.id,
                confidence,
            })
        } else {
            Ok(PhraseVerification::Mismatch)
        }
    }

    /// Replaces the active phrase and password after checking the old
    /// password.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::InvalidRequest`] for a blank new phrase or
    /// password.
    pub async fn update(
        &self,
        user_id: UserId,
        old_password: &str,
        new_phrase: &str,
        new_password: &str,
    ) -> Result<PhraseUpdateOutcome, SafeguardError> {
        let replacement = Self::build(user_id, new_phrase, new_password)?;
        let _guard = self.locks.lock(user_id).await;
        let Some(active) = self.store.active_phrase(user_id).await? else {
            return Ok(PhraseUpdateOutcome::NoActivePhrase);
        };
        if !verify_password(old_password, &active.password_hash)? {
            tracing::warn!(%user_id, "voice phrase update with wrong password");
            return Ok(PhraseUpdateOutcome::InvalidPassword);
        }
        self.store.insert_phrase_exclusive(&replacement).await?;
        tracing::info!(%user_id, phrase_id = %replacement.id, "voice phrase updated");
        Ok(PhraseUpdateOutcome::Updated {
            phrase_id: replacement.id,
        })
    }

    /// Whether the user has an active phrase.
    ///
    /// # Errors
    ///
    /// Returns [`SafeguardError::PersistenceError`] on storage failure.
    pub async fn status(&self, user_id: UserId) -> Result<PhraseStatus, SafeguardError> {
        let active = self.store.active_phrase(user_id).await?;
        Ok(PhraseStatus {
            has_phrase: active.is_some(),
            created_at: active.as_ref().map(|p| p.created_at),
            phrase: active.map(|p| p.phrase),
        })
    }

    fn build(user_id: UserId, phrase: &str, password: &str) -> Result<VoicePhrase, SafeguardError> {
        let phrase = normalize_phrase(phrase);
        if phrase.is_empty() {
            return Err(SafeguardError::InvalidRequest(
                "phrase must not be blank".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(SafeguardError::InvalidRequest(
                "password must not be empty".to_string(),
            ));
        }
        Ok(VoicePhrase {
            id: PhraseId::new(),
            user_id,
            phrase,
            password_hash: hash_password(password)?,
            is_active: true,
            created_at: Utc::now(),
        })
    }
}
