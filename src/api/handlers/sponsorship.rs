//! Sponsorship handlers: create, list, detail, close and the staged payment
//! flow.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use crate::api::auth::AuthUser;
use crate::api::dto::{
    ConfirmPaymentRequest, ConfirmPaymentResponse, CreateSponsorshipRequest,
    CreateSponsorshipResponse, InitiatePaymentRequest, InitiatePaymentResponse, PaginationParams,
    SponsorshipDetailResponse, SponsorshipListResponse,
};
use crate::app_state::AppState;
use crate::domain::{NewSponsorship, Role, Sponsorship, SponsorshipId, SponsorshipStatus};
use crate::error::{ErrorResponse, HealthPalError};

/// `POST /sponsorships` — Open a funding campaign.
///
/// # Errors
///
/// Returns [`HealthPalError`] for non-patients or invalid input.
#[utoipa::path(
    post,
    path = "/api/v1/sponsorships",
    tag = "Sponsorships",
    summary = "Create a sponsorship",
    description = "Opens a funding campaign for the calling patient's treatment.",
    request_body = CreateSponsorshipRequest,
    responses(
        (status = 201, description = "Sponsorship created", body = CreateSponsorshipResponse),
        (status = 400, description = "Invalid goal or missing fields", body = ErrorResponse),
        (status = 403, description = "Caller is not a patient", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn create_sponsorship(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateSponsorshipRequest>,
) -> Result<impl IntoResponse, HealthPalError> {
    user.require(&[Role::Patient])?;
    let sponsorship = state
        .ledger
        .create_sponsorship(NewSponsorship {
            beneficiary_id: user.id(),
            treatment_type: req.treatment_type,
            goal_amount: req.goal_amount,
            description: req.description,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSponsorshipResponse {
            sponsorship_id: sponsorship.id,
            status: sponsorship.status,
        }),
    ))
}

/// `GET /sponsorships` — List open campaigns.
///
/// # Errors
///
/// Returns [`HealthPalError`] on store failures.
#[utoipa::path(
    get,
    path = "/api/v1/sponsorships",
    tag = "Sponsorships",
    summary = "List open sponsorships",
    description = "Returns a paginated list of campaigns still accepting donations, newest first.",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated sponsorship list", body = SponsorshipListResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list_sponsorships(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, HealthPalError> {
    let open = state.ledger.list_open().await?;
    let (data, pagination) = params.paginate(open);
    Ok(Json(SponsorshipListResponse { data, pagination }))
}

/// `GET /sponsorships/{id}` — Campaign with donations and statistics.
///
/// # Errors
///
/// Returns [`HealthPalError::NotFound`] for unknown ids.
#[utoipa::path(
    get,
    path = "/api/v1/sponsorships/{id}",
    tag = "Sponsorships",
    summary = "Get sponsorship details",
    description = "Returns the campaign, its completed donations and donor statistics.",
    params(
        ("id" = uuid::Uuid, Path, description = "Sponsorship UUID"),
    ),
    responses(
        (status = 200, description = "Sponsorship details", body = SponsorshipDetailResponse),
        (status = 404, description = "Sponsorship not found", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_sponsorship(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, HealthPalError> {
    let detail = state
        .ledger
        .get_detail(SponsorshipId::from_uuid(id))
        .await?;
    Ok(Json(SponsorshipDetailResponse {
        sponsorship: detail.sponsorship,
        donations: detail.donations,
        statistics: detail.stats,
    }))
}

/// `PATCH /sponsorships/{id}/close` — Close a campaign.
///
/// # Errors
///
/// Returns [`HealthPalError`] for unknown ids, callers other than the
/// beneficiary or an admin, and campaigns already closed.
#[utoipa::path(
    patch,
    path = "/api/v1/sponsorships/{id}/close",
    tag = "Sponsorships",
    summary = "Close a sponsorship",
    description = "Stops a campaign from accepting donations. Allowed for the owning patient and admins.",
    params(
        ("id" = uuid::Uuid, Path, description = "Sponsorship UUID"),
    ),
    responses(
        (status = 200, description = "Sponsorship closed", body = Sponsorship),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Sponsorship not found", body = ErrorResponse),
        (status = 409, description = "Already closed", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn close_sponsorship(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, HealthPalError> {
    user.require(&[Role::Patient, Role::Admin])?;
    let closed = state
        .ledger
        .close(SponsorshipId::from_uuid(id), &user.0)
        .await?;
    Ok(Json(closed))
}

/// `POST /sponsorships/{id}/payment/initiate` — Start a gateway payment.
///
/// # Errors
///
/// Returns [`HealthPalError`] when the campaign does not accept donations or
/// the gateway fails.
#[utoipa::path(
    post,
    path = "/api/v1/sponsorships/{id}/payment/initiate",
    tag = "Payments",
    summary = "Initiate a card payment",
    description = "Creates a gateway payment intent for a donation. The ledger is not touched until confirmation.",
    params(
        ("id" = uuid::Uuid, Path, description = "Sponsorship UUID"),
    ),
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = InitiatePaymentResponse),
        (status = 400, description = "Invalid amount or campaign not accepting", body = ErrorResponse),
        (status = 404, description = "Sponsorship not found", body = ErrorResponse),
        (status = 502, description = "Payment gateway failure", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<impl IntoResponse, HealthPalError> {
    user.require(&[Role::Donor])?;
    let started = state
        .ledger
        .initiate_payment(SponsorshipId::from_uuid(id), user.id(), req.amount)
        .await?;
    Ok(Json(InitiatePaymentResponse {
        client_secret: started.client_secret,
        payment_intent_id: started.payment_intent_id,
        amount: started.amount,
    }))
}

/// `POST /sponsorships/{id}/payment/confirm` — Record a gateway payment.
///
/// # Errors
///
/// Returns [`HealthPalError`] when the payment has not succeeded, the
/// amount differs from the intent, or the gateway fails.
#[utoipa::path(
    post,
    path = "/api/v1/sponsorships/{id}/payment/confirm",
    tag = "Payments",
    summary = "Confirm a card payment",
    description = "Records the donation behind a payment intent. Confirming the same intent twice returns the first transaction.",
    params(
        ("id" = uuid::Uuid, Path, description = "Sponsorship UUID"),
    ),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Donation recorded or replayed", body = ConfirmPaymentResponse),
        (status = 400, description = "Payment not completed or amount mismatch", body = ErrorResponse),
        (status = 409, description = "Payment reference belongs to another donation", body = ErrorResponse),
        (status = 502, description = "Payment gateway failure", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> Result<impl IntoResponse, HealthPalError> {
    user.require(&[Role::Donor])?;
    let recorded = state
        .ledger
        .confirm_payment(
            &req.payment_intent_id,
            SponsorshipId::from_uuid(id),
            user.id(),
            req.amount,
        )
        .await?;
    Ok(Json(ConfirmPaymentResponse {
        transaction_id: recorded.transaction.id,
        status: recorded.transaction.status,
        is_funded: recorded.sponsorship.status == SponsorshipStatus::Funded,
        replayed: recorded.replayed,
        receipt_url: recorded.transaction.receipt_url,
    }))
}

/// `POST /sponsorships/{id}/donate` — Legacy alias of the confirm endpoint.
///
/// # Errors
///
/// Same as [`confirm_payment`].
#[utoipa::path(
    post,
    path = "/api/v1/sponsorships/{id}/donate",
    tag = "Payments",
    summary = "Confirm a card payment (legacy path)",
    description = "Kept for older clients. Behaves exactly like `/payment/confirm`.",
    params(
        ("id" = uuid::Uuid, Path, description = "Sponsorship UUID"),
    ),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Donation recorded or replayed", body = ConfirmPaymentResponse),
        (status = 400, description = "Payment not completed or amount mismatch", body = ErrorResponse),
        (status = 409, description = "Payment reference belongs to another donation", body = ErrorResponse),
        (status = 502, description = "Payment gateway failure", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn donate(
    state: State<AppState>,
    user: AuthUser,
    id: Path<uuid::Uuid>,
    req: Json<ConfirmPaymentRequest>,
) -> Result<impl IntoResponse, HealthPalError> {
    confirm_payment(state, user, id, req).await
}

/// Sponsorship and payment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/sponsorships",
            post(create_sponsorship).get(list_sponsorships),
        )
        .route("/sponsorships/{id}", get(get_sponsorship))
        .route("/sponsorships/{id}/close", patch(close_sponsorship))
        .route("/sponsorships/{id}/payment/initiate", post(initiate_payment))
        .route("/sponsorships/{id}/payment/confirm", post(confirm_payment))
        .route("/sponsorships/{id}/donate", post(donate))
}
