//! Stripe REST adapter for [`PaymentGateway`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{IntentRequest, IntentStatus, PaymentError, PaymentGateway, PaymentIntent};
use crate::domain::Amount;

/// Default Stripe API origin.
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    amount: i64,
    status: IntentStatus,
    #[serde(default)]
    latest_charge: Option<ChargeRef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChargeRef {
    Expanded { receipt_url: Option<String> },
    Id(String),
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl From<StripeIntent> for PaymentIntent {
    fn from(raw: StripeIntent) -> Self {
        let receipt_url = match raw.latest_charge {
            Some(ChargeRef::Expanded { receipt_url }) => receipt_url,
            Some(ChargeRef::Id(_)) | None => None,
        };
        Self {
            id: raw.id,
            client_secret: raw.client_secret,
            amount: Amount::from_cents(raw.amount),
            status: raw.status,
            receipt_url,
        }
    }
}

fn transport(err: reqwest::Error) -> PaymentError {
    if err.is_timeout() {
        PaymentError::Timeout
    } else {
        PaymentError::Transport(err.to_string())
    }
}

/// Stripe payment-intents client.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    /// Builds a client with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, PaymentError> {
        let form = [
            ("amount", request.amount.cents().to_string()),
            ("currency", request.currency.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[sponsorship_id]", request.sponsorship_id.to_string()),
            ("metadata[donor_id]", request.donor_id.to_string()),
        ];
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(transport)?;
        let intent: StripeIntent = Self::decode(response).await?;
        tracing::info!(intent_id = %intent.id, amount = %request.amount, "payment intent created");
        Ok(intent.into())
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/payment_intents/{intent_id}?expand%5B%5D=latest_charge",
                self.api_base
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(transport)?;
        let intent: StripeIntent = Self::decode(response).await?;
        Ok(intent.into())
    }

    async fn refund(&self, intent_id: &str) -> Result<String, PaymentError> {
        let response = self
            .client
            .post(format!("{}/v1/refunds", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&[("payment_intent", intent_id)])
            .send()
            .await
            .map_err(transport)?;
        let refund: StripeRefund = Self::decode(response).await?;
        tracing::info!(intent_id, refund_id = %refund.id, "gateway refund issued");
        Ok(refund.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expanded_charge_carries_receipt() {
        let raw = r#"{
            "id": "pi_1",
            "client_secret": "pi_1_secret",
            "amount": 2500,
            "status": "succeeded",
            "latest_charge": {"id": "ch_1", "receipt_url": "https://pay.example/r/1"}
        }"#;
        let parsed: Result<StripeIntent, _> = serde_json::from_str(raw);
        let intent = parsed.map(PaymentIntent::from);
        assert!(intent.is_ok_and(|i| {
            i.amount == Amount::from_cents(2_500)
                && i.status == IntentStatus::Succeeded
                && i.receipt_url.as_deref() == Some("https://pay.example/r/1")
        }));
    }

    #[test]
    fn unexpanded_charge_has_no_receipt() {
        let raw = r#"{"id": "pi_2", "amount": 100, "status": "processing", "latest_charge": "ch_2"}"#;
        let parsed: Result<StripeIntent, _> = serde_json::from_str(raw);
        assert!(parsed.is_ok_and(|p| PaymentIntent::from(p).receipt_url.is_none()));
    }

    #[test]
    fn base_url_is_normalised() {
        let gateway = StripeGateway::new("http://localhost:12111/", "sk_test", Duration::from_secs(1));
        assert!(gateway.is_ok_and(|g| g.api_base == "http://localhost:12111"));
    }
}
