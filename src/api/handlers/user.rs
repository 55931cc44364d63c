//! Profile and emergency contact handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::api::dto::{AddContactRequest, MessageResponse};
use crate::api::extract::AuthUser;
use crate::app_state::AppState;
use crate::domain::{ContactId, EmergencyContact, ProfileUpdate, User};
use crate::error::{ErrorResponse, SafeguardError};

/// `GET /users/profile` — The caller's profile.
#[utoipa::path(
    get,
    path = "/api/v1/users/profile",
    tag = "Users",
    summary = "Get profile",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Profile", body = User),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn get_profile(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

/// `PUT /users/profile` — Partially update the caller's profile.
///
/// # Errors
///
/// Returns [`SafeguardError::InvalidRequest`] for a blank name.
#[utoipa::path(
    put,
    path = "/api/v1/users/profile",
    tag = "Users",
    summary = "Update profile",
    description = "Only the fields present in the body change.",
    security(("bearer" = [])),
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = User),
        (status = 400, description = "Invalid field", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, SafeguardError> {
    let updated = state.users.update_profile(user.id(), update).await?;
    Ok(Json(updated))
}

/// `GET /users/emergency-contacts` — The caller's contacts.
///
/// # Errors
///
/// Returns [`SafeguardError::PersistenceError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/users/emergency-contacts",
    tag = "Users",
    summary = "List emergency contacts",
    description = "Ordered by priority, then creation time.",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Contacts", body = Vec<EmergencyContact>),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn list_contacts(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<EmergencyContact>>, SafeguardError> {
    let contacts = state.users.contacts(user.id()).await?;
    Ok(Json(contacts))
}

/// `POST /users/emergency-contacts` — Add a contact.
///
/// # Errors
///
/// Returns [`SafeguardError::InvalidRequest`] for a blank name or phone.
#[utoipa::path(
    post,
    path = "/api/v1/users/emergency-contacts",
    tag = "Users",
    summary = "Add emergency contact",
    security(("bearer" = [])),
    request_body = AddContactRequest,
    responses(
        (status = 201, description = "Contact created", body = EmergencyContact),
        (status = 400, description = "Invalid contact", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn add_contact(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AddContactRequest>,
) -> Result<impl IntoResponse, SafeguardError> {
    let contact = state.users.add_contact(user.id(), req.into()).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

/// `DELETE /users/emergency-contacts/{contact_id}` — Remove a contact.
///
/// # Errors
///
/// Returns [`SafeguardError::ContactNotFound`] if the caller has no such
/// contact.
#[utoipa::path(
    delete,
    path = "/api/v1/users/emergency-contacts/{contact_id}",
    tag = "Users",
    summary = "Remove emergency contact",
    security(("bearer" = [])),
    params(("contact_id" = ContactId, Path, description = "Contact UUID")),
    responses(
        (status = 200, description = "Contact removed", body = MessageResponse),
        (status = 404, description = "No such contact", body = ErrorResponse),
    )
)]
pub async fn remove_contact(
    State(state): State<AppState>,
    user: AuthUser,
    Path(contact_id): Path<ContactId>,
) -> Result<Json<MessageResponse>, SafeguardError> {
    state.users.remove_contact(user.id(), contact_id).await?;
    Ok(Json(MessageResponse::ok("Emergency contact removed")))
}

/// User routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(get_profile).put(update_profile))
        .route(
            "/users/emergency-contacts",
            get(list_contacts).post(add_contact),
        )
        .route(
            "/users/emergency-contacts/{contact_id}",
            delete(remove_contact),
        )
}
