//! Outbound notifications (email and SMS).
//!
//! Delivery goes through the [`Notifier`] port. The [`dispatcher`] task turns
//! committed [`crate::domain::LedgerEvent`]s into messages; a failed or slow
//! delivery is logged and never reaches the request that caused it.

use std::fmt;

use async_trait::async_trait;

pub mod dispatcher;

pub use dispatcher::{Dispatcher, spawn_dispatcher};

/// Delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The recipient address or number is unusable.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The delivery provider failed.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The delivery did not finish in time.
    #[error("delivery timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// An email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Port to email / SMS providers.
#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    /// Sends an email.
    async fn send_email(&self, email: &Email) -> Result<(), NotifyError>;

    /// Sends an SMS to `phone`.
    async fn send_sms(&self, phone: &str, message: &str) -> Result<(), NotifyError>;
}

/// Notifier that only writes the message to the log.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    from: String,
}

impl LogNotifier {
    /// Creates a notifier reporting `from` as the sender.
    #[must_use]
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, email: &Email) -> Result<(), NotifyError> {
        if !email.to.contains('@') {
            return Err(NotifyError::InvalidRecipient(email.to.clone()));
        }
        tracing::info!(from = %self.from, to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }

    async fn send_sms(&self, phone: &str, message: &str) -> Result<(), NotifyError> {
        if phone.trim().is_empty() {
            return Err(NotifyError::InvalidRecipient(phone.to_string()));
        }
        tracing::info!(to = %phone, chars = message.len(), "sms sent");
        Ok(())
    }
}
