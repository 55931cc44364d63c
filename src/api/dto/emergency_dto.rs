//! Emergency DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{EmergencySession, GeoPoint, SessionId, TriggerType};
use crate::service::{TriggerRequest, TriggerSummary};

/// Request body for `POST /emergency/trigger`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TriggerEmergencyRequest {
    /// What fired the trigger. Defaults to `manual`.
    #[serde(default = "default_trigger_type")]
    pub trigger_type: TriggerType,
    /// Current position, if known.
    #[serde(default)]
    pub location: Option<GeoPoint>,
    /// Matched phrase for voice triggers.
    #[serde(default)]
    pub phrase: Option<String>,
    /// Recogniser confidence for voice triggers.
    #[serde(default)]
    pub confidence: Option<f64>,
}

const fn default_trigger_type() -> TriggerType {
    TriggerType::Manual
}

impl From<TriggerEmergencyRequest> for TriggerRequest {
    fn from(req: TriggerEmergencyRequest) -> Self {
        Self {
            trigger_type: req.trigger_type,
            location: req.location,
            phrase: req.phrase,
            confidence: req.confidence,
        }
    }
}

/// Response body for `POST /emergency/trigger`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TriggerEmergencyResponse {
    /// Always `true` on 200.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// The new active session.
    pub session_id: SessionId,
    /// Contacts whose SMS was accepted.
    pub contacts_notified: usize,
    /// Size of the contact list.
    pub contacts_total: usize,
    /// Nearby users alerted.
    pub nearby_users_notified: usize,
    /// Live connections that received the alert event.
    pub realtime_recipients: usize,
    /// Trigger timestamp.
    pub triggered_at: DateTime<Utc>,
}

impl From<TriggerSummary> for TriggerEmergencyResponse {
    fn from(summary: TriggerSummary) -> Self {
        Self {
            success: true,
            message: "Emergency alert triggered successfully".to_string(),
            session_id: summary.session_id,
            contacts_notified: summary.contacts_notified,
            contacts_total: summary.contacts_total,
            nearby_users_notified: summary.nearby_users_notified,
            realtime_recipients: summary.realtime_recipients,
            triggered_at: summary.triggered_at,
        }
    }
}

/// Request body for `POST /emergency/dismiss`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DismissEmergencyRequest {
    /// The caller's active session.
    pub session_id: SessionId,
    /// Optional reason shown to observers.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request body for `POST /emergency/resolve`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveEmergencyRequest {
    /// The caller's active session.
    pub session_id: SessionId,
}

/// Response body of dismiss and resolve.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionClosedResponse {
    /// Always `true` on 200.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// The session in its terminal state.
    pub session: EmergencySession,
}
