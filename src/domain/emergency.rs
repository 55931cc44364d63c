//! Emergency sessions and the alert rows fanned out from them.
//!
//! A session moves `active → dismissed` or `active → resolved`; both are
//! terminal. Alerts are written together with their session and never
//! change afterwards except for delivery status, which is owned by the
//! external delivery pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AlertId, GeoPoint, SessionId, UserId};

/// Synthetic recipient id of the always-notified police dispatch.
pub const POLICE_RECIPIENT_ID: &str = "local_police_station";

/// Error returned when a stored enum discriminator is unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The offending string.
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Wire and storage representation.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// What activated an emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// The user's trained voice phrase was heard.
    Voice,
    /// The user pressed the panic button.
    Manual,
    /// A device-side detector fired (fall, crash, ...).
    Automatic,
}

string_enum!(TriggerType, "trigger_type", {
    Voice => "voice",
    Manual => "manual",
    Automatic => "automatic",
});

/// Lifecycle state of an emergency session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Alerts are out; the only non-terminal state.
    Active,
    /// The user called it off.
    Dismissed,
    /// The situation was handled.
    Resolved,
}

string_enum!(SessionStatus, "session_status", {
    Active => "active",
    Dismissed => "dismissed",
    Resolved => "resolved",
});

impl SessionStatus {
    /// `true` for `dismissed` and `resolved`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Voice-trigger details stored alongside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TriggerMetadata {
    /// Transcript or phrase that fired the trigger.
    pub phrase: String,
    /// Recogniser confidence in `[0, 1]`.
    pub confidence: Option<f64>,
}

/// One triggered emergency.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EmergencySession {
    /// Session identity.
    pub id: SessionId,
    /// The user in distress.
    pub user_id: UserId,
    /// What fired the trigger.
    pub trigger_type: TriggerType,
    /// Position at trigger time, if the client had one.
    pub location: Option<GeoPoint>,
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Trigger timestamp.
    pub triggered_at: DateTime<Utc>,
    /// When the session reached a terminal state.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Voice-trigger details.
    pub metadata: Option<TriggerMetadata>,
}

impl EmergencySession {
    /// Opens a new active session stamped with the current time.
    #[must_use]
    pub fn open(
        user_id: UserId,
        trigger_type: TriggerType,
        location: Option<GeoPoint>,
        metadata: Option<TriggerMetadata>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            trigger_type,
            location,
            status: SessionStatus::Active,
            triggered_at: Utc::now(),
            resolved_at: None,
            metadata,
        }
    }
}

/// Who an alert was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    /// One of the user's emergency contacts.
    Contact,
    /// A registered user who was close by.
    NearbyUser,
    /// The police dispatch.
    Police,
}

string_enum!(RecipientType, "recipient_type", {
    Contact => "contact",
    NearbyUser => "nearby_user",
    Police => "police",
});

/// Channel an alert was sent through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertMethod {
    /// Text message through the notifier.
    Sms,
    /// Real-time event on the live connection.
    Push,
    /// Internal dispatch integration.
    System,
}

string_enum!(AlertMethod, "alert_method", {
    Sms => "sms",
    Push => "push",
    System => "system",
});

/// Delivery state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Handed to the channel.
    Sent,
    /// Confirmed by the channel.
    Delivered,
    /// Rejected by the channel.
    Failed,
}

string_enum!(AlertStatus, "alert_status", {
    Sent => "sent",
    Delivered => "delivered",
    Failed => "failed",
});

/// One (session, recipient) fan-out row.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EmergencyAlert {
    /// Alert identity.
    pub id: AlertId,
    /// Owning session.
    pub session_id: SessionId,
    /// Kind of recipient.
    pub recipient_type: RecipientType,
    /// Contact id, user id, or [`POLICE_RECIPIENT_ID`].
    pub recipient_id: String,
    /// Delivery channel.
    pub alert_method: AlertMethod,
    /// Delivery state.
    pub status: AlertStatus,
    /// Creation timestamp.
    pub sent_at: DateTime<Utc>,
}

impl EmergencyAlert {
    /// Builds a freshly sent alert for `session_id`.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        recipient_type: RecipientType,
        recipient_id: String,
        alert_method: AlertMethod,
    ) -> Self {
        Self {
            id: AlertId::new(),
            session_id,
            recipient_type,
            recipient_id,
            alert_method,
            status: AlertStatus::Sent,
            sent_at: Utc::now(),
        }
    }

    /// The unconditional police alert for `session_id`.
    #[must_use]
    pub fn police(session_id: SessionId) -> Self {
        Self::new(
            session_id,
            RecipientType::Police,
            POLICE_RECIPIENT_ID.to_string(),
            AlertMethod::System,
        )
    }
}
