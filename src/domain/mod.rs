//! Domain layer: identifiers, geography, accounts, emergencies, the
//! location index, and live-connection delivery.
//!
//! Nothing here touches HTTP or SQL. Services in [`crate::service`] compose
//! these types with a [`crate::persistence::Store`] and a
//! [`crate::notify::Notifier`].

pub mod emergency;
pub mod event;
pub mod event_bus;
pub mod geo;
pub mod ids;
pub mod location;
pub mod session_registry;
pub mod user;

pub use emergency::{
    AlertMethod, AlertStatus, EmergencyAlert, EmergencySession, POLICE_RECIPIENT_ID,
    RecipientType, SessionStatus, TriggerMetadata, TriggerType, UnknownVariant,
};
pub use event::{EmergencyAlertPayload, ServerEvent};
pub use event_bus::EventBus;
pub use geo::{Coordinate, EARTH_RADIUS_KM, GeoPoint, haversine_km};
pub use ids::{AlertId, ConnectionId, ContactId, PhraseId, PingId, SessionId, UserId};
pub use location::{LocationPing, LocationStore, RecentPings, window_start};
pub use session_registry::{EventSender, SessionRegistry};
pub use user::{
    DEFAULT_CONTACT_PRIORITY, EmergencyContact, ProfileUpdate, PublicProfile, User, VoicePhrase,
    normalize_phrase,
};
