//! Payment gateway port and adapters.
//!
//! The ledger only talks to [`PaymentGateway`]. [`StripeGateway`] is the HTTP
//! adapter; [`DisabledGateway`] answers every call with
//! [`PaymentError::NotConfigured`] when no gateway key is set.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Amount, SponsorshipId, UserId};

pub mod stripe;
pub mod webhook;

pub use stripe::StripeGateway;
pub use webhook::{GatewayEvent, verify_signature};

/// Failures talking to the payment gateway.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// No gateway credentials configured.
    #[error("payment gateway is not configured")]
    NotConfigured,

    /// The gateway did not answer in time.
    #[error("payment gateway timed out")]
    Timeout,

    /// Transport-level failure.
    #[error("payment gateway unreachable: {0}")]
    Transport(String),

    /// The gateway rejected the request.
    #[error("payment gateway returned {status}: {message}")]
    Api {
        /// HTTP status returned by the gateway.
        status: u16,
        /// Gateway error message.
        message: String,
    },

    /// The gateway answered with an unexpected body.
    #[error("unexpected payment gateway response: {0}")]
    InvalidResponse(String),
}

/// Gateway-side state of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Funds captured.
    Succeeded,
    /// Capture in flight; settles through a webhook.
    Processing,
    /// Waiting for a payment method.
    RequiresPaymentMethod,
    /// Waiting for confirmation.
    RequiresConfirmation,
    /// Waiting for customer action (e.g. 3-D Secure).
    RequiresAction,
    /// Authorized, waiting for capture.
    RequiresCapture,
    /// Cancelled.
    Canceled,
    /// Any status this service does not know.
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    /// Returns the gateway's string for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Processing => "processing",
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request for a new payment intent.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    /// Amount to charge.
    pub amount: Amount,
    /// ISO currency code, lowercase.
    pub currency: String,
    /// Sponsorship being funded.
    pub sponsorship_id: SponsorshipId,
    /// Paying donor.
    pub donor_id: UserId,
}

/// A payment intent as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Gateway identifier; used as the transaction's external reference.
    pub id: String,
    /// Secret the client uses to complete the payment.
    pub client_secret: Option<String>,
    /// Charged amount.
    pub amount: Amount,
    /// Current status.
    pub status: IntentStatus,
    /// Receipt link of the latest charge, when known.
    pub receipt_url: Option<String>,
}

/// Port to an external card-payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync + fmt::Debug {
    /// Creates a payment intent for `request`.
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, PaymentError>;

    /// Fetches the current state of an intent.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError>;

    /// Refunds the full amount captured by an intent and returns the refund id.
    async fn refund(&self, intent_id: &str) -> Result<String, PaymentError>;
}

/// Gateway used when no credentials are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_intent(&self, _request: &IntentRequest) -> Result<PaymentIntent, PaymentError> {
        Err(PaymentError::NotConfigured)
    }

    async fn retrieve_intent(&self, _intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        Err(PaymentError::NotConfigured)
    }

    async fn refund(&self, _intent_id: &str) -> Result<String, PaymentError> {
        Err(PaymentError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_deserializes() {
        let status: Result<IntentStatus, _> = serde_json::from_str("\"requires_reauth\"");
        assert!(status.is_ok_and(|s| s == IntentStatus::Unknown));
        let status: Result<IntentStatus, _> = serde_json::from_str("\"processing\"");
        assert!(status.is_ok_and(|s| s == IntentStatus::Processing));
    }

    #[tokio::test]
    async fn disabled_gateway_refuses() {
        let gateway = DisabledGateway;
        assert!(matches!(
            gateway.retrieve_intent("pi_1").await,
            Err(PaymentError::NotConfigured)
        ));
    }
}
