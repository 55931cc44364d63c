//! Voice phrase DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::PhraseId;
use crate::service::{PhraseUpdateOutcome, PhraseVerification};

/// Request body for `POST /voice/train-phrase`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TrainPhraseRequest {
    /// Phrase to listen for.
    pub phrase: String,
    /// Password that guards later changes.
    pub password: String,
}

/// Response body for `POST /voice/train-phrase`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TrainPhraseResponse {
    /// Always `true` on 200.
    pub success: bool,
    /// The new active phrase.
    pub phrase_id: PhraseId,
    /// Human-readable outcome.
    pub message: String,
}

/// Request body for `POST /voice/verify-phrase`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyPhraseRequest {
    /// Recognised speech.
    pub transcript: String,
    /// Recogniser confidence in `[0, 1]`. Defaults to 0.8.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

const fn default_confidence() -> f64 {
    0.8
}

/// Response body for `POST /voice/verify-phrase`.
#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyPhraseResponse {
    /// Whether the phrase matched.
    #[serde(rename = "match")]
    pub matched: bool,
    /// The matched phrase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrase_id: Option<PhraseId>,
    /// Confidence of a match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Human-readable outcome.
    pub message: String,
}

impl From<PhraseVerification> for VerifyPhraseResponse {
    fn from(outcome: PhraseVerification) -> Self {
        match outcome {
            PhraseVerification::Matched {
                phrase_id,
                confidence,
            } => Self {
                matched: true,
                phrase_id: Some(phrase_id),
                confidence: Some(confidence),
                message: "Phrase matched successfully".to_string(),
            },
            PhraseVerification::Mismatch => Self {
                matched: false,
                phrase_id: None,
                confidence: None,
                message: "Phrase not matched".to_string(),
            },
            PhraseVerification::NoActivePhrase => Self {
                matched: false,
                phrase_id: None,
                confidence: None,
                message: "No active phrase found".to_string(),
            },
        }
    }
}

/// Request body for `PUT /voice/update-phrase`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePhraseRequest {
    /// Password of the current phrase.
    pub old_password: String,
    /// Replacement phrase.
    pub phrase: String,
    /// Password for the replacement.
    pub new_password: String,
}

/// Response body for `PUT /voice/update-phrase`.
#[derive(Debug, Serialize, ToSchema)]
pub struct UpdatePhraseResponse {
    /// Whether the phrase was replaced.
    pub success: bool,
    /// The new phrase, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrase_id: Option<PhraseId>,
    /// Human-readable outcome.
    pub message: String,
}

impl From<PhraseUpdateOutcome> for UpdatePhraseResponse {
    fn from(outcome: PhraseUpdateOutcome) -> Self {
        let (success, phrase_id, message) = match outcome {
            PhraseUpdateOutcome::Updated { phrase_id } => {
                (true, Some(phrase_id), "Voice phrase updated successfully")
            }
            PhraseUpdateOutcome::NoActivePhrase => (false, None, "No active phrase found"),
            PhraseUpdateOutcome::InvalidPassword => (false, None, "Invalid password"),
        };
        Self {
            success,
            phrase_id,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_serializes_match_key() {
        let body = VerifyPhraseResponse::from(PhraseVerification::Mismatch);
        let json = serde_json::to_value(&body).unwrap_or_default();
        assert_eq!(json.get("match"), Some(&serde_json::Value::Bool(false)));
        assert!(json.get("phrase_id").is_none());
    }

    #[test]
    fn wrong_password_is_not_success() {
        let body = UpdatePhraseResponse::from(PhraseUpdateOutcome::InvalidPassword);
        assert!(!body.success);
        assert_eq!(body.message, "Invalid password");
    }
}
