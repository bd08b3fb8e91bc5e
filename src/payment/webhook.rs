//! Gateway webhook signature verification and event parsing.
//!
//! The signature header has the form `t=<unix seconds>,v1=<hex digest>[,v1=...]`.
//! The digest is HMAC-SHA256 over `"<t>.<raw body>"` keyed with the webhook
//! secret; any `v1` entry may match.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::HealthPalError;

type HmacSha256 = Hmac<Sha256>;

/// Event types this service reacts to. Anything else is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A payment intent captured its funds.
    PaymentSucceeded {
        /// Intent id.
        intent_id: String,
    },
    /// A payment intent failed.
    PaymentFailed {
        /// Intent id.
        intent_id: String,
    },
    /// A charge was refunded.
    ChargeRefunded {
        /// Intent the refunded charge belongs to.
        intent_id: String,
    },
    /// An event type with no ledger effect.
    Ignored {
        /// The event type as sent.
        event_type: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: RawObject,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    id: Option<String>,
    payment_intent: Option<String>,
}

impl GatewayEvent {
    /// Parses a webhook body.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidRequest`] for malformed bodies or a
    /// known event type missing its intent reference.
    pub fn parse(payload: &[u8]) -> Result<Self, HealthPalError> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| HealthPalError::InvalidRequest(format!("malformed webhook body: {e}")))?;
        let missing = |field: &str| {
            HealthPalError::InvalidRequest(format!(
                "{} event without data.object.{field}",
                raw.event_type
            ))
        };

        match raw.event_type.as_str() {
            "payment_intent.succeeded" => Ok(Self::PaymentSucceeded {
                intent_id: raw.data.object.id.clone().ok_or_else(|| missing("id"))?,
            }),
            "payment_intent.payment_failed" => Ok(Self::PaymentFailed {
                intent_id: raw.data.object.id.clone().ok_or_else(|| missing("id"))?,
            }),
            "charge.refunded" => Ok(Self::ChargeRefunded {
                intent_id: raw
                    .data
                    .object
                    .payment_intent
                    .clone()
                    .ok_or_else(|| missing("payment_intent"))?,
            }),
            other => Ok(Self::Ignored {
                event_type: other.to_string(),
            }),
        }
    }
}

/// Checks `header` against `payload` signed with `secret`.
///
/// `now` is the current unix time; signatures older (or newer) than
/// `tolerance_secs` are rejected.
///
/// # Errors
///
/// Returns [`HealthPalError::Unauthenticated`] for a malformed header, a
/// stale timestamp or a digest mismatch.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), HealthPalError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| HealthPalError::Unauthenticated("signature without timestamp".to_string()))?;
    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| HealthPalError::Unauthenticated("invalid signature timestamp".to_string()))?;
    let within = now
        .checked_sub(signed_at)
        .map(i64::unsigned_abs)
        .is_some_and(|skew| skew <= tolerance_secs.unsigned_abs());
    if !within {
        return Err(HealthPalError::Unauthenticated(
            "signature timestamp outside tolerance".to_string(),
        ));
    }

    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| HealthPalError::Internal(format!("webhook key rejected: {e}")))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(HealthPalError::Unauthenticated(
        "webhook signature mismatch".to_string(),
    ))
}

/// Produces a header for `payload` the way the gateway does. Used by tests
/// and local tooling.
///
/// # Errors
///
/// Returns [`HealthPalError::Internal`] if the key is rejected.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, HealthPalError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| HealthPalError::Internal(format!("webhook key rejected: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_9"}}}"#;

    fn header(at: i64) -> String {
        let Ok(h) = sign_payload(BODY, SECRET, at) else {
            panic!("signing works");
        };
        h
    }

    #[test]
    fn valid_signature_is_accepted() {
        assert!(verify_signature(BODY, &header(1_000), SECRET, 300, 1_100).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let tampered = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_X"}}}"#;
        assert!(matches!(
            verify_signature(tampered, &header(1_000), SECRET, 300, 1_000),
            Err(HealthPalError::Unauthenticated(_))
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        assert!(verify_signature(BODY, &header(1_000), "whsec_other", 300, 1_000).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        assert!(verify_signature(BODY, &header(1_000), SECRET, 300, 1_301).is_err());
    }

    #[test]
    fn extreme_timestamps_are_rejected_without_overflow() {
        let now = 1_700_000_000;
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={t},v1=00");
            assert!(matches!(
                verify_signature(BODY, &header, SECRET, 300, now),
                Err(HealthPalError::Unauthenticated(_))
            ));
        }
        assert!(verify_signature(BODY, "t=0,v1=00", SECRET, 300, i64::MIN).is_err());
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(verify_signature(BODY, "v1=deadbeef", SECRET, 300, 0).is_err());
        assert!(verify_signature(BODY, "t=abc,v1=00", SECRET, 300, 0).is_err());
    }

    #[test]
    fn parses_known_events() {
        assert!(matches!(
            GatewayEvent::parse(BODY),
            Ok(GatewayEvent::PaymentSucceeded { intent_id }) if intent_id == "pi_9"
        ));
        let refund = br#"{"type":"charge.refunded","data":{"object":{"id":"ch_1","payment_intent":"pi_9"}}}"#;
        assert!(matches!(
            GatewayEvent::parse(refund),
            Ok(GatewayEvent::ChargeRefunded { intent_id }) if intent_id == "pi_9"
        ));
        let other = br#"{"type":"customer.created","data":{"object":{"id":"cus_1"}}}"#;
        assert!(matches!(
            GatewayEvent::parse(other),
            Ok(GatewayEvent::Ignored { .. })
        ));
        assert!(GatewayEvent::parse(b"not json").is_err());
    }
}
