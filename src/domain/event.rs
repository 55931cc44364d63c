//! Real-time events pushed to live connections.
//!
//! Every server → client frame is a [`ServerEvent`], serialized adjacently
//! tagged as `{"event": "<name>", "data": {...}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GeoPoint, PublicProfile, SessionId, TriggerType, UserId};

/// Body of the `emergency_alert` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlertPayload {
    /// Session that raised the alert.
    pub session_id: SessionId,
    /// Who needs help.
    pub user: PublicProfile,
    /// Where they were when they triggered, if known.
    pub location: Option<GeoPoint>,
    /// What fired the trigger.
    pub trigger_type: TriggerType,
    /// Trigger timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Server → client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The connection's `authenticate` succeeded.
    Authenticated {
        /// Always `true`; kept for client compatibility.
        success: bool,
        /// The bound identity.
        user_id: UserId,
    },

    /// Authentication failed or the binding was taken over.
    AuthenticationError {
        /// Human-readable reason.
        error: String,
    },

    /// A nearby user moved.
    LocationBroadcast {
        /// Who moved.
        user_id: UserId,
        /// New position.
        location: GeoPoint,
        /// Client-reported timestamp, falling back to ingestion time.
        timestamp: DateTime<Utc>,
    },

    /// Hint to the originating connection that its voice phrase matched.
    EmergencyTrigger {
        /// Always [`TriggerType::Voice`] today.
        trigger_type: TriggerType,
        /// The speaker.
        user_id: UserId,
        /// Transcript that matched.
        transcript: String,
        /// Recogniser confidence.
        confidence: f64,
        /// Detection timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Someone nearby, or someone who lists you as a contact, needs help.
    EmergencyAlert(EmergencyAlertPayload),

    /// An emergency was called off.
    EmergencyDismissed {
        /// The dismissed session.
        session_id: SessionId,
        /// Its owner.
        user_id: UserId,
        /// Optional reason given by the owner.
        reason: Option<String>,
        /// Dismissal timestamp.
        dismissed_at: DateTime<Utc>,
    },

    /// An emergency was marked as handled.
    EmergencyResolved {
        /// The resolved session.
        session_id: SessionId,
        /// Its owner.
        user_id: UserId,
        /// Resolution timestamp.
        resolved_at: DateTime<Utc>,
    },

    /// A client frame could not be processed.
    Error {
        /// Numeric code, mirroring HTTP semantics.
        code: u16,
        /// Human-readable message.
        message: String,
    },
}

impl ServerEvent {
    /// Returns the event name as a static string slice.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Authenticated { .. } => "authenticated",
            Self::AuthenticationError { .. } => "authentication_error",
            Self::LocationBroadcast { .. } => "location_broadcast",
            Self::EmergencyTrigger { .. } => "emergency_trigger",
            Self::EmergencyAlert(_) => "emergency_alert",
            Self::EmergencyDismissed { .. } => "emergency_dismissed",
            Self::EmergencyResolved { .. } => "emergency_resolved",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_and_data() {
        let event = ServerEvent::AuthenticationError {
            error: "Invalid token".to_string(),
        };
        let Ok(json) = serde_json::to_value(&event) else {
            panic!("serialization failed");
        };
        assert_eq!(json["event"], "authentication_error");
        assert_eq!(json["data"]["error"], "Invalid token");
    }

    #[test]
    fn emergency_alert_payload_is_flat_under_data() {
        let user_id = UserId::new();
        let event = ServerEvent::EmergencyAlert(EmergencyAlertPayload {
            session_id: SessionId::new(),
            user: PublicProfile {
                id: user_id,
                name: "Asha".to_string(),
                phone: Some("+911234".to_string()),
            },
            location: None,
            trigger_type: TriggerType::Manual,
            timestamp: Utc::now(),
        });
        let Ok(json) = serde_json::to_value(&event) else {
            panic!("serialization failed");
        };
        assert_eq!(json["event"], event.event_name());
        assert_eq!(json["data"]["user"]["name"], "Asha");
        assert_eq!(json["data"]["trigger_type"], "manual");
    }

    #[test]
    fn names_match_serde_tags() {
        let event = ServerEvent::EmergencyResolved {
            session_id: SessionId::new(),
            user_id: UserId::new(),
            resolved_at: Utc::now(),
        };
        let Ok(json) = serde_json::to_value(&event) else {
            panic!("serialization failed");
        };
        assert_eq!(json["event"], event.event_name());
    }
}
