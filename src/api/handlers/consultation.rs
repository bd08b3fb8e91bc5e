//! Consultation handlers: booking, listing, status changes and calls.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use crate::api::auth::AuthUser;
use crate::api::dto::{
    BookConsultationRequest, BookConsultationResponse, CallListResponse, CallStatsResponse,
    ConsultationListResponse, EndCallRequest, EndCallResponse, StartCallResponse,
    UpdateStatusRequest,
};
use crate::app_state::AppState;
use crate::domain::{CallModality, Consultation, ConsultationId, Role};
use crate::error::{ErrorResponse, HealthPalError};
use crate::service::BookingRequest;

/// `POST /consultations` — Book a consultation.
///
/// # Errors
///
/// Returns [`HealthPalError`] for non-patients or an unknown doctor.
#[utoipa::path(
    post,
    path = "/api/v1/consultations",
    tag = "Consultations",
    summary = "Book a consultation",
    description = "Books a pending consultation with a registered doctor.",
    request_body = BookConsultationRequest,
    responses(
        (status = 201, description = "Consultation booked", body = BookConsultationResponse),
        (status = 400, description = "Unknown doctor or invalid input", body = ErrorResponse),
        (status = 403, description = "Caller is not a patient", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn book_consultation(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<BookConsultationRequest>,
) -> Result<impl IntoResponse, HealthPalError> {
    user.require(&[Role::Patient])?;
    let consultation = state
        .consultations
        .book(
            user.id(),
            BookingRequest {
                doctor_id: req.doctor_id,
                scheduled_time: req.consultation_date,
                mode: req.mode,
                notes: req.notes,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(BookConsultationResponse {
            consultation_id: consultation.id,
            status: consultation.status,
        }),
    ))
}

/// `GET /consultations` — The caller's consultations.
///
/// # Errors
///
/// Returns [`HealthPalError::Forbidden`] for roles other than patient and
/// doctor.
#[utoipa::path(
    get,
    path = "/api/v1/consultations",
    tag = "Consultations",
    summary = "List consultations",
    description = "Patients see the consultations they booked; doctors see the ones assigned to them.",
    responses(
        (status = 200, description = "Consultations", body = ConsultationListResponse),
        (status = 403, description = "Caller is neither patient nor doctor", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list_consultations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, HealthPalError> {
    let data = state.consultations.list_for(&user.0).await?;
    Ok(Json(ConsultationListResponse { data }))
}

/// `PATCH /consultations/{id}/status` — Change a consultation's status.
///
/// # Errors
///
/// Returns [`HealthPalError`] for non-participants, a patient accepting, or
/// a change outside the transition table.
#[utoipa::path(
    patch,
    path = "/api/v1/consultations/{id}/status",
    tag = "Consultations",
    summary = "Update consultation status",
    description = "Accept (doctor only), cancel or complete a consultation.",
    params(
        ("id" = uuid::Uuid, Path, description = "Consultation UUID"),
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = Consultation),
        (status = 403, description = "Not allowed for this caller", body = ErrorResponse),
        (status = 404, description = "Consultation not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, HealthPalError> {
    let updated = state
        .consultations
        .update_status(ConsultationId::from_uuid(id), user.id(), req.status)
        .await?;
    Ok(Json(updated))
}

async fn start_call(
    state: &AppState,
    user: &AuthUser,
    id: uuid::Uuid,
    modality: CallModality,
) -> Result<(StatusCode, Json<StartCallResponse>), HealthPalError> {
    let started = state
        .consultations
        .start_call(ConsultationId::from_uuid(id), user.id(), modality)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(StartCallResponse {
            call_id: started.call.id,
            consultation_id: started.call.consultation_id,
            force_ended: started.force_ended.iter().map(|c| c.id).collect(),
        }),
    ))
}

async fn list_calls(
    state: &AppState,
    user: &AuthUser,
    id: uuid::Uuid,
    modality: CallModality,
) -> Result<Json<CallListResponse>, HealthPalError> {
    let data = state
        .consultations
        .list_calls(ConsultationId::from_uuid(id), modality, user.id())
        .await?;
    Ok(Json(CallListResponse { data }))
}

async fn end_call(
    state: &AppState,
    user: &AuthUser,
    id: uuid::Uuid,
    modality: CallModality,
    req: EndCallRequest,
) -> Result<Json<EndCallResponse>, HealthPalError> {
    let ended = state
        .consultations
        .end_call(
            ConsultationId::from_uuid(id),
            modality,
            user.id(),
            req.call_id,
            req.duration_seconds,
        )
        .await?;
    Ok(Json(EndCallResponse {
        call_id: ended.call.id,
        duration_seconds: ended.call.duration_seconds.unwrap_or_default(),
        consultation_status: ended.consultation.status,
    }))
}

/// `POST /consultations/{id}/video-calls` — Start a video call.
///
/// # Errors
///
/// Returns [`HealthPalError`] for non-participants, a non-video
/// consultation, or a consultation that is not accepted or in progress.
#[utoipa::path(
    post,
    path = "/api/v1/consultations/{id}/video-calls",
    tag = "Calls",
    summary = "Start a video call",
    description = "Starts a video call. Any video call still active in the consultation is completed first.",
    params(
        ("id" = uuid::Uuid, Path, description = "Consultation UUID"),
    ),
    responses(
        (status = 201, description = "Call started", body = StartCallResponse),
        (status = 400, description = "Consultation mode is not video", body = ErrorResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 409, description = "Consultation not accepted", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn start_video_call(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, HealthPalError> {
    start_call(&state, &user, id, CallModality::Video).await
}

/// `POST /consultations/{id}/audio-calls` — Start an audio call.
///
/// # Errors
///
/// Returns [`HealthPalError`] for non-participants, a non-audio
/// consultation, or a consultation that is not accepted or in progress.
#[utoipa::path(
    post,
    path = "/api/v1/consultations/{id}/audio-calls",
    tag = "Calls",
    summary = "Start an audio call",
    description = "Starts an audio call. Any audio call still active in the consultation is completed first.",
    params(
        ("id" = uuid::Uuid, Path, description = "Consultation UUID"),
    ),
    responses(
        (status = 201, description = "Call started", body = StartCallResponse),
        (status = 400, description = "Consultation mode is not audio", body = ErrorResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 409, description = "Consultation not accepted", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn start_audio_call(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, HealthPalError> {
    start_call(&state, &user, id, CallModality::Audio).await
}

/// `GET /consultations/{id}/video-calls` — List video calls.
///
/// # Errors
///
/// Returns [`HealthPalError`] for unknown consultations or non-participants.
#[utoipa::path(
    get,
    path = "/api/v1/consultations/{id}/video-calls",
    tag = "Calls",
    summary = "List video calls",
    params(
        ("id" = uuid::Uuid, Path, description = "Consultation UUID"),
    ),
    responses(
        (status = 200, description = "Video calls, newest first", body = CallListResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Consultation not found", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list_video_calls(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, HealthPalError> {
    list_calls(&state, &user, id, CallModality::Video).await
}

/// `GET /consultations/{id}/audio-calls` — List audio calls.
///
/// # Errors
///
/// Returns [`HealthPalError`] for unknown consultations or non-participants.
#[utoipa::path(
    get,
    path = "/api/v1/consultations/{id}/audio-calls",
    tag = "Calls",
    summary = "List audio calls",
    params(
        ("id" = uuid::Uuid, Path, description = "Consultation UUID"),
    ),
    responses(
        (status = 200, description = "Audio calls, newest first", body = CallListResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Consultation not found", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list_audio_calls(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, HealthPalError> {
    list_calls(&state, &user, id, CallModality::Audio).await
}

/// `PATCH /consultations/{id}/video-calls/end` — End a video call.
///
/// # Errors
///
/// Returns [`HealthPalError`] when no matching call exists, for
/// non-participants, or for calls already ended.
#[utoipa::path(
    patch,
    path = "/api/v1/consultations/{id}/video-calls/end",
    tag = "Calls",
    summary = "End a video call",
    description = "Ends the given (or the active) video call and completes the consultation. A client-supplied duration wins over the timestamps.",
    params(
        ("id" = uuid::Uuid, Path, description = "Consultation UUID"),
    ),
    request_body = EndCallRequest,
    responses(
        (status = 200, description = "Call ended", body = EndCallResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Call not found", body = ErrorResponse),
        (status = 409, description = "Call already ended", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn end_video_call(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
    body: Option<Json<EndCallRequest>>,
) -> Result<impl IntoResponse, HealthPalError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    end_call(&state, &user, id, CallModality::Video, req).await
}

/// `PATCH /consultations/{id}/audio-calls/end` — End an audio call.
///
/// # Errors
///
/// Returns [`HealthPalError`] when no matching call exists, for
/// non-participants, or for calls already ended.
#[utoipa::path(
    patch,
    path = "/api/v1/consultations/{id}/audio-calls/end",
    tag = "Calls",
    summary = "End an audio call",
    description = "Ends the given (or the active) audio call and completes the consultation. A client-supplied duration wins over the timestamps.",
    params(
        ("id" = uuid::Uuid, Path, description = "Consultation UUID"),
    ),
    request_body = EndCallRequest,
    responses(
        (status = 200, description = "Call ended", body = EndCallResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Call not found", body = ErrorResponse),
        (status = 409, description = "Call already ended", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn end_audio_call(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
    body: Option<Json<EndCallRequest>>,
) -> Result<impl IntoResponse, HealthPalError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    end_call(&state, &user, id, CallModality::Audio, req).await
}

/// `GET /calls/stats` — The caller's call figures per modality.
///
/// # Errors
///
/// Returns [`HealthPalError`] on store failures.
#[utoipa::path(
    get,
    path = "/api/v1/calls/stats",
    tag = "Calls",
    summary = "Call statistics",
    description = "Count, average and total duration of the completed calls the caller started, per modality.",
    responses(
        (status = 200, description = "Per-modality figures", body = CallStatsResponse),
    ),
    security(("bearer" = []))
)]
pub async fn call_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, HealthPalError> {
    let data = state.consultations.call_stats(user.id()).await?;
    Ok(Json(CallStatsResponse { data }))
}

/// Consultation and call routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/consultations",
            post(book_consultation).get(list_consultations),
        )
        .route("/consultations/{id}/status", patch(update_status))
        .route(
            "/consultations/{id}/video-calls",
            post(start_video_call).get(list_video_calls),
        )
        .route("/consultations/{id}/video-calls/end", patch(end_video_call))
        .route(
            "/consultations/{id}/audio-calls",
            post(start_audio_call).get(list_audio_calls),
        )
        .route("/consultations/{id}/audio-calls/end", patch(end_audio_call))
        .route("/calls/stats", get(call_stats))
}
