//! Payment gateway webhook receiver.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::WebhookAck;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, HealthPalError};

/// Header carrying the `t=...,v1=...` signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// `POST /webhooks/payments` — Receive a gateway event.
///
/// The body is read raw so the signature is checked over the exact bytes
/// that were signed.
///
/// # Errors
///
/// Returns [`HealthPalError::Unauthenticated`] for a bad signature and
/// [`HealthPalError::InvalidRequest`] for a malformed body.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payments",
    tag = "Payments",
    summary = "Payment gateway webhook",
    description = "Settles pending payments and applies refunds reported by the gateway. Replays and unknown references are acknowledged without effect.",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Malformed event", body = ErrorResponse),
        (status = 401, description = "Invalid signature", body = ErrorResponse),
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HealthPalError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = state.ledger.handle_webhook(&body, signature).await?;
    tracing::debug!(?outcome, "webhook processed");
    Ok(Json(WebhookAck { received: true }))
}

/// Webhook routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(payment_webhook))
}
