//! Donation and payment DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Amount, MethodStats, PaymentMethod, SponsorshipId, Transaction, TransactionId, TransactionStatus};

/// Request body for `POST /donations`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DonationRequest {
    /// Target campaign.
    #[schema(value_type = uuid::Uuid)]
    #[serde(alias = "sponsorshipId")]
    pub sponsorship_id: SponsorshipId,
    /// Amount, as a number or decimal string.
    #[schema(value_type = String, example = "50.00")]
    pub amount: Amount,
    /// `card` or `bank` (case-insensitive).
    #[serde(alias = "paymentMethod")]
    pub payment_method: String,
}

/// Response body for `POST /donations` (201 Created).
#[derive(Debug, Serialize, ToSchema)]
pub struct DonationResponse {
    /// New transaction id.
    #[serde(rename = "transactionId")]
    #[schema(value_type = uuid::Uuid)]
    pub transaction_id: TransactionId,
    /// Donated amount.
    #[schema(value_type = String)]
    pub amount: Amount,
    /// Normalised payment method.
    pub payment_method: PaymentMethod,
    /// Transaction status.
    pub status: TransactionStatus,
    /// The campaign is funded after this donation.
    #[serde(rename = "isFunded")]
    pub is_funded: bool,
    /// Campaign total after this donation.
    #[schema(value_type = String)]
    pub sponsorship_funded_amount: Amount,
    /// Campaign goal.
    #[schema(value_type = String)]
    pub sponsorship_goal: Amount,
}

/// Response body for `GET /donations/history`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DonationHistoryResponse {
    /// Completed donations, newest first.
    pub donations: Vec<Transaction>,
    /// Number of listed donations.
    pub total_donations: u64,
    /// Sum of the listed donations.
    #[schema(value_type = String)]
    pub total_amount_donated: Amount,
}

/// Response body for `GET /donations/stats`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MethodStatsResponse {
    /// One entry per payment method with completed donations.
    pub data: Vec<MethodStats>,
}

/// Request body for `POST /sponsorships/{id}/payment/initiate`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiatePaymentRequest {
    /// Amount to charge.
    #[schema(value_type = String, example = "25.00")]
    pub amount: Amount,
}

/// Response body for `POST /sponsorships/{id}/payment/initiate`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentResponse {
    /// Secret the client completes the payment with.
    pub client_secret: Option<String>,
    /// Handle to pass to the confirm endpoint.
    pub payment_intent_id: String,
    /// Amount to be charged.
    #[schema(value_type = String)]
    pub amount: Amount,
}

/// Request body for `POST /sponsorships/{id}/payment/confirm`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmPaymentRequest {
    /// Handle returned by the initiate endpoint.
    #[serde(alias = "paymentIntentId")]
    pub payment_intent_id: String,
    /// Amount that was charged.
    #[schema(value_type = String, example = "25.00")]
    pub amount: Amount,
}

/// Response body for `POST /sponsorships/{id}/payment/confirm`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentResponse {
    /// Recorded transaction.
    #[schema(value_type = uuid::Uuid)]
    pub transaction_id: TransactionId,
    /// `completed`, or `pending` while the gateway is still processing.
    pub status: TransactionStatus,
    /// The campaign is funded.
    pub is_funded: bool,
    /// This handle had already been confirmed.
    pub replayed: bool,
    /// Gateway receipt link.
    pub receipt_url: Option<String>,
}

/// Response body for `POST /webhooks/payments`.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// Always `true` once the delivery was accepted.
    pub received: bool,
}
