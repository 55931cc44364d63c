//! Service layer: business logic orchestration.
//!
//! [`EmergencyService`] owns the emergency state machine and its fan-out.
//! [`LocationService`] and [`ProximityEngine`] serve live positions.
//! [`UserService`] and [`VoiceService`] cover accounts, contacts and
//! trained phrases. Services talk to storage through
//! [`crate::persistence::Store`] and to clients through
//! [`crate::domain::EventBus`].

pub mod emergency_service;
pub mod location_service;
pub mod proximity;
pub mod retention;
pub mod user_locks;
pub mod user_service;
pub mod voice_service;

pub use emergency_service::{
    EmergencyService, EmergencySettings, EmergencyStatus, TriggerRequest, TriggerSummary,
};
pub use location_service::LocationService;
pub use proximity::{NearbyUser, ProximityEngine};
pub use user_locks::UserLocks;
pub use user_service::{NewContact, Session, UserService};
pub use voice_service::{PhraseStatus, PhraseUpdateOutcome, PhraseVerification, VoiceService};
