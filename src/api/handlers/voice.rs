//! Voice phrase handlers.

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::api::dto::{
    TrainPhraseRequest, TrainPhraseResponse, UpdatePhraseRequest, UpdatePhraseResponse,
    VerifyPhraseRequest, VerifyPhraseResponse,
};
use crate::api::extract::AuthUser;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, SafeguardError};
use crate::service::PhraseStatus;

/// `POST /voice/train-phrase` — Train the caller's trigger phrase.
///
/// # Errors
///
/// Returns [`SafeguardError::InvalidRequest`] for a blank phrase or password.
#[utoipa::path(
    post,
    path = "/api/v1/voice/train-phrase",
    tag = "Voice",
    summary = "Train phrase",
    description = "The new phrase becomes the only active one.",
    security(("bearer" = [])),
    request_body = TrainPhraseRequest,
    responses(
        (status = 200, description = "Phrase trained", body = TrainPhraseResponse),
        (status = 400, description = "Blank phrase or password", body = ErrorResponse),
    )
)]
pub async fn train_phrase(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<TrainPhraseRequest>,
) -> Result<Json<TrainPhraseResponse>, SafeguardError> {
    let phrase_id = state
        .voice
        .train(user.id(), &req.phrase, &req.password)
        .await?;
    Ok(Json(TrainPhraseResponse {
        success: true,
        phrase_id,
        message: "Voice phrase trained successfully".to_string(),
    }))
}

/// `POST /voice/verify-phrase` — Match a transcript against the active phrase.
///
/// # Errors
///
/// Returns [`SafeguardError::InvalidRequest`] for a confidence outside
/// `[0, 1]`. A mismatch is a 200 with `match: false`.
#[utoipa::path(
    post,
    path = "/api/v1/voice/verify-phrase",
    tag = "Voice",
    summary = "Verify phrase",
    security(("bearer" = [])),
    request_body = VerifyPhraseRequest,
    responses(
        (status = 200, description = "Verification outcome", body = VerifyPhraseResponse),
        (status = 400, description = "Invalid confidence", body = ErrorResponse),
    )
)]
pub async fn verify_phrase(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<VerifyPhraseRequest>,
) -> Result<Json<VerifyPhraseResponse>, SafeguardError> {
    let outcome = state
        .voice
        .verify(user.id(), &req.transcript, req.confidence)
        .await?;
    Ok(Json(outcome.into()))
}

/// `PUT /voice/update-phrase` — Replace the phrase after checking the old
/// password.
///
/// # Errors
///
/// Returns [`SafeguardError::InvalidRequest`] for a blank replacement. A
/// wrong password is a 200 with `success: false`.
#[utoipa::path(
    put,
    path = "/api/v1/voice/update-phrase",
    tag = "Voice",
    summary = "Update phrase",
    security(("bearer" = [])),
    request_body = UpdatePhraseRequest,
    responses(
        (status = 200, description = "Update outcome", body = UpdatePhraseResponse),
        (status = 400, description = "Blank phrase or password", body = ErrorResponse),
    )
)]
pub async fn update_phrase(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdatePhraseRequest>,
) -> Result<Json<UpdatePhraseResponse>, SafeguardError> {
    let outcome = state
        .voice
        .update(user.id(), &req.old_password, &req.phrase, &req.new_password)
        .await?;
    Ok(Json(outcome.into()))
}

/// `GET /voice/status` — Whether the caller has a trained phrase.
///
/// # Errors
///
/// Returns [`SafeguardError::PersistenceError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/voice/status",
    tag = "Voice",
    summary = "Phrase status",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Phrase status", body = PhraseStatus),
    )
)]
pub async fn voice_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PhraseStatus>, SafeguardError> {
    Ok(Json(state.voice.status(user.id()).await?))
}

/// Voice routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/voice/train-phrase", post(train_phrase))
        .route("/voice/verify-phrase", post(verify_phrase))
        .route("/voice/update-phrase", put(update_phrase))
        .route("/voice/status", get(voice_status))
}
