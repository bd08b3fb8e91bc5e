//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::api::auth::JwtKeys;
use crate::domain::EventBus;
use crate::service::{ConsultationService, LedgerService, UserService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Sponsorships, donations, payments and refunds.
    pub ledger: Arc<LedgerService>,
    /// Consultations and calls.
    pub consultations: Arc<ConsultationService>,
    /// User directory.
    pub users: Arc<UserService>,
    /// Event bus feeding the notification dispatcher.
    pub event_bus: EventBus,
    /// Bearer token verification keys.
    pub jwt: Arc<JwtKeys>,
}
