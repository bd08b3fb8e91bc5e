//! Donation handlers: record, history, per-campaign list, stats and refunds.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::AuthUser;
use crate::api::dto::{
    DonationHistoryResponse, DonationRequest, DonationResponse, MethodStatsResponse,
};
use crate::app_state::AppState;
use crate::domain::{Role, SponsorshipId, SponsorshipStatus, Transaction, TransactionId};
use crate::error::{ErrorResponse, HealthPalError};

/// `POST /donations` — Record a direct donation.
///
/// # Errors
///
/// Returns [`HealthPalError`] for invalid amounts or methods, unknown
/// campaigns, and campaigns that are closed or already funded.
#[utoipa::path(
    post,
    path = "/api/v1/donations",
    tag = "Donations",
    summary = "Donate to a sponsorship",
    description = "Records a card or bank donation. The donation that reaches the goal may exceed it; once funded the campaign rejects further donations.",
    request_body = DonationRequest,
    responses(
        (status = 201, description = "Donation recorded", body = DonationResponse),
        (status = 400, description = "Invalid amount or method, campaign closed or already funded", body = ErrorResponse),
        (status = 403, description = "Caller is not a donor", body = ErrorResponse),
        (status = 404, description = "Sponsorship not found", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn create_donation(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<DonationRequest>,
) -> Result<impl IntoResponse, HealthPalError> {
    user.require(&[Role::Donor])?;
    let recorded = state
        .ledger
        .record_donation(req.sponsorship_id, user.id(), req.amount, &req.payment_method)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DonationResponse {
            transaction_id: recorded.transaction.id,
            amount: recorded.transaction.amount,
            payment_method: recorded.transaction.payment_method,
            status: recorded.transaction.status,
            is_funded: recorded.sponsorship.status == SponsorshipStatus::Funded,
            sponsorship_funded_amount: recorded.sponsorship.donated_amount,
            sponsorship_goal: recorded.sponsorship.goal_amount,
        }),
    ))
}

/// `GET /donations/history` — The caller's completed donations.
///
/// # Errors
///
/// Returns [`HealthPalError`] for non-donors or store failures.
#[utoipa::path(
    get,
    path = "/api/v1/donations/history",
    tag = "Donations",
    summary = "Donation history",
    description = "Returns the caller's completed donations, newest first, with totals over the listed rows.",
    responses(
        (status = 200, description = "Donation history", body = DonationHistoryResponse),
        (status = 403, description = "Caller is not a donor", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn donation_history(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, HealthPalError> {
    user.require(&[Role::Donor])?;
    let history = state.ledger.history(user.id()).await?;
    Ok(Json(DonationHistoryResponse {
        donations: history.transactions,
        total_donations: history.total_count,
        total_amount_donated: history.total_amount,
    }))
}

/// `GET /donations/sponsorship/{id}` — Completed donations of a campaign.
///
/// # Errors
///
/// Returns [`HealthPalError::NotFound`] for unknown campaigns.
#[utoipa::path(
    get,
    path = "/api/v1/donations/sponsorship/{id}",
    tag = "Donations",
    summary = "Donations of a sponsorship",
    params(
        ("id" = uuid::Uuid, Path, description = "Sponsorship UUID"),
    ),
    responses(
        (status = 200, description = "Completed donations", body = Vec<Transaction>),
        (status = 404, description = "Sponsorship not found", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn sponsorship_donations(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, HealthPalError> {
    let donations = state
        .ledger
        .sponsorship_donations(SponsorshipId::from_uuid(id))
        .await?;
    Ok(Json(donations))
}

/// `GET /donations/stats` — Completed-donation figures per payment method.
///
/// # Errors
///
/// Returns [`HealthPalError`] on store failures.
#[utoipa::path(
    get,
    path = "/api/v1/donations/stats",
    tag = "Donations",
    summary = "Donation statistics by payment method",
    responses(
        (status = 200, description = "Per-method figures", body = MethodStatsResponse),
    ),
    security(("bearer" = []))
)]
pub async fn donation_stats(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<impl IntoResponse, HealthPalError> {
    let data = state.ledger.method_stats().await?;
    Ok(Json(MethodStatsResponse { data }))
}

/// `POST /donations/{id}/refund` — Refund a completed donation.
///
/// # Errors
///
/// Returns [`HealthPalError`] for non-admins, unknown transactions,
/// transactions that are not completed, or gateway failures.
#[utoipa::path(
    post,
    path = "/api/v1/donations/{id}/refund",
    tag = "Donations",
    summary = "Refund a donation",
    description = "Marks a completed donation as refunded and debits its sponsorship. Gateway payments are refunded at the gateway first.",
    params(
        ("id" = uuid::Uuid, Path, description = "Transaction UUID"),
    ),
    responses(
        (status = 200, description = "Donation refunded", body = Transaction),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "Transaction not found", body = ErrorResponse),
        (status = 409, description = "Transaction is not completed", body = ErrorResponse),
        (status = 502, description = "Payment gateway failure", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn refund_donation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, HealthPalError> {
    user.require(&[Role::Admin])?;
    let refunded = state.ledger.refund(TransactionId::from_uuid(id)).await?;
    Ok(Json(refunded.transaction))
}

/// Donation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/donations", post(create_donation))
        .route("/donations/history", get(donation_history))
        .route("/donations/stats", get(donation_stats))
        .route("/donations/sponsorship/{id}", get(sponsorship_donations))
        .route("/donations/{id}/refund", post(refund_donation))
}
