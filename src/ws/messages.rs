//! WebSocket wire types.
//!
//! Client → server frames are adjacently tagged like server events:
//! `{"event": "<name>", "data": {...}}`. Server → client frames are
//! [`crate::domain::ServerEvent`].

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::GeoPoint;

/// Events a client can send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Bind this connection to the token's user.
    Authenticate {
        /// Bearer token.
        token: String,
    },
    /// The user moved.
    LocationUpdate {
        /// New position. `lat`/`lng` are accepted as aliases.
        #[serde(flatten)]
        location: GeoPoint,
        /// Client clock, echoed in the broadcast.
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    /// The on-device recogniser heard something that may be the phrase.
    VoicePhraseDetected {
        /// Recognised speech.
        transcript: String,
        /// Recogniser confidence in `[0, 1]`.
        confidence: f64,
        /// Client clock.
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
}

impl ClientEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::LocationUpdate { .. } => "location_update",
            Self::VoicePhraseDetected { .. } => "voice_phrase_detected",
        }
    }

    /// `true` for events that need an authenticated connection.
    #[must_use]
    pub const fn requires_auth(&self) -> bool {
        !matches!(self, Self::Authenticate { .. })
    }
}
