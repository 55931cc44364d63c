//! OpenAPI document assembled from the handler annotations.

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use super::dto::{
    AddContactRequest, DismissEmergencyRequest, LocationHistoryResponse, LocationUpdateResponse,
    MessageResponse, NearbyUsersResponse, ResolveEmergencyRequest, SessionClosedResponse,
    TokenRequest, TokenResponse, TrainPhraseRequest, TrainPhraseResponse,
    TriggerEmergencyRequest, TriggerEmergencyResponse, UpdatePhraseRequest, UpdatePhraseResponse,
    VerifyPhraseRequest, VerifyPhraseResponse,
};
use super::handlers::{auth, emergency, location, system, user, voice};
use crate::domain::{
    AlertMethod, AlertStatus, EmergencyAlert, EmergencyContact, EmergencySession, GeoPoint,
    LocationPing, ProfileUpdate, RecipientType, SessionStatus, TriggerMetadata, TriggerType, User,
};
use crate::error::{ErrorBody, ErrorResponse};
use crate::service::{EmergencyStatus, NearbyUser, PhraseStatus};

/// The gateway's OpenAPI document.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "safeguard-gateway",
        description = "Personal-safety alerting: contacts, live location, proximity search and emergency fan-out. Real-time events are served on `GET /ws`."
    ),
    paths(
        system::health_handler,
        auth::issue_token,
        auth::refresh_token,
        user::get_profile,
        user::update_profile,
        user::list_contacts,
        user::add_contact,
        user::remove_contact,
        location::update_location,
        location::nearby_users,
        location::location_history,
        emergency::trigger_emergency,
        emergency::dismiss_emergency,
        emergency::resolve_emergency,
        emergency::emergency_status,
        emergency::emergency_history,
        emergency::session_alerts,
        voice::train_phrase,
        voice::verify_phrase,
        voice::update_phrase,
        voice::voice_status,
    ),
    components(schemas(
        ErrorResponse, ErrorBody, MessageResponse,
        TokenRequest, TokenResponse, User, ProfileUpdate,
        EmergencyContact, AddContactRequest,
        GeoPoint, LocationPing, LocationUpdateResponse, NearbyUser, NearbyUsersResponse,
        LocationHistoryResponse,
        TriggerType, SessionStatus, TriggerMetadata, EmergencySession, RecipientType,
        AlertMethod, AlertStatus, EmergencyAlert, EmergencyStatus,
        TriggerEmergencyRequest, TriggerEmergencyResponse, DismissEmergencyRequest,
        ResolveEmergencyRequest, SessionClosedResponse,
        TrainPhraseRequest, TrainPhraseResponse, VerifyPhraseRequest, VerifyPhraseResponse,
        UpdatePhraseRequest, UpdatePhraseResponse, PhraseStatus,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "System", description = "Health"),
        (name = "Auth", description = "Identity exchange"),
        (name = "Users", description = "Profile and emergency contacts"),
        (name = "Location", description = "Live location and proximity"),
        (name = "Emergency", description = "Emergency lifecycle"),
        (name = "Voice", description = "Trained trigger phrases"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by the handlers.
#[derive(Debug)]
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}
