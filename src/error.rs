//! Service error types with HTTP status code mapping.
//!
//! [`HealthPalError`] is the central error type for every layer: domain
//! rules, stores, adapters and handlers all return it. Each variant maps to
//! a numeric code, an HTTP status and a structured JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::SponsorshipId;
use crate::payment::PaymentError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": "sponsorship is already fully funded: 3f1c...",
///   "code": 2002,
///   "details": null
/// }
/// ```
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable human-readable error message.
    pub error: String,
    /// Numeric error code (see the code ranges on [`HealthPalError`]).
    pub code: u32,
    /// Optional diagnostic details. Only populated for server-side
    /// failures when detail exposure is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Full error body stashed in response extensions for server-side
/// failures. The API layer swaps it in when detail exposure is enabled.
#[derive(Debug, Clone)]
pub struct ErrorDetails(pub ErrorResponse);

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                        |
/// |-----------|-------------------|------------------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request                    |
/// | 2000–2999 | Not Found / State | 404 Not Found / 400 / 409 Conflict |
/// | 3000–3999 | Server            | 500 / 502                          |
/// | 4000–4999 | Access            | 401 / 403                          |
#[derive(Debug, thiserror::Error)]
pub enum HealthPalError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Donation or goal amount is missing, zero or negative.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Payment method is not one of the accepted methods.
    #[error("invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    /// Call modality does not match the consultation mode.
    #[error("consultation mode is {mode}, cannot start a {modality} call")]
    ModeMismatch {
        /// Mode the consultation was booked with.
        mode: String,
        /// Modality the caller tried to start.
        modality: String,
    },

    /// The external payment has not succeeded.
    #[error("payment not completed: status {0}")]
    PaymentNotCompleted(String),

    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (e.g. `"sponsorship"`).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Sponsorship already reached its goal and accepts no more donations.
    #[error("sponsorship is already fully funded: {0}")]
    AlreadyFunded(SponsorshipId),

    /// Sponsorship was closed and accepts no more donations.
    #[error("sponsorship is closed: {0}")]
    SponsorshipClosed(SponsorshipId),

    /// Status change not present in the entity's transition table.
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        /// Entity kind (e.g. `"consultation"`).
        entity: &'static str,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// A uniqueness constraint was violated.
    #[error("duplicate {0}")]
    Duplicate(String),

    /// Caller is not authenticated or the credentials are invalid.
    #[error("authentication required: {0}")]
    Unauthenticated(String),

    /// Caller's role or ownership does not permit the operation.
    #[error("insufficient permissions: {0}")]
    Forbidden(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Payment gateway failure.
    #[error("payment gateway error: {0}")]
    Payment(#[from] PaymentError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HealthPalError {
    /// Shorthand for [`HealthPalError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidAmount(_) => 1002,
            Self::InvalidPaymentMethod(_) => 1003,
            Self::ModeMismatch { .. } => 1004,
            Self::PaymentNotCompleted(_) => 1005,
            Self::NotFound { .. } => 2001,
            Self::AlreadyFunded(_) => 2002,
            Self::SponsorshipClosed(_) => 2003,
            Self::InvalidTransition { .. } => 2004,
            Self::Duplicate(_) => 2005,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Payment(_) => 3002,
            Self::Unauthenticated(_) => 4001,
            Self::Forbidden(_) => 4003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidAmount(_)
            | Self::InvalidPaymentMethod(_)
            | Self::ModeMismatch { .. }
            | Self::PaymentNotCompleted(_)
            | Self::AlreadyFunded(_)
            | Self::SponsorshipClosed(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. } | Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns `true` for failures whose message must not leak to clients.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::Internal(_) | Self::Payment(_)
        )
    }

    fn public_message(&self) -> String {
        match self {
            Self::Persistence(_) | Self::Internal(_) => "internal server error".to_string(),
            Self::Payment(_) => "payment processing failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for HealthPalError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.public_message(),
            code: self.error_code(),
            details: None,
        };

        if self.is_server_error() {
            tracing::error!(code = body.code, error = %self, "request failed");
            let detailed = ErrorResponse {
                details: Some(self.to_string()),
                ..body.clone()
            };
            let mut response = axum::Json(body).into_response();
            *response.status_mut() = status;
            response.extensions_mut().insert(ErrorDetails(detailed));
            return response;
        }

        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        let err = HealthPalError::AlreadyFunded(SponsorshipId::new());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), 2002);

        let err = HealthPalError::InvalidTransition {
            entity: "consultation",
            from: "completed".to_string(),
            to: "accepted".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            err.to_string(),
            "invalid consultation transition: completed -> accepted"
        );
    }

    #[test]
    fn server_errors_hide_cause() {
        let err = HealthPalError::Persistence("connection refused".to_string());
        assert!(err.is_server_error());
        assert_eq!(err.public_message(), "internal server error");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let details = response.extensions().get::<ErrorDetails>();
        assert!(details.is_some_and(|d| {
            d.0.details
                .as_deref()
                .is_some_and(|s| s.contains("connection refused"))
        }));
    }

    #[test]
    fn not_found_helper_formats_message() {
        let err = HealthPalError::not_found("call", "abc");
        assert_eq!(err.to_string(), "call not found: abc");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
