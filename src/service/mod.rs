//! Service layer: business logic orchestration.
//!
//! [`LedgerService`] runs the donation ledger and the payment flow,
//! [`ConsultationService`] the consultation and call lifecycle, and
//! [`UserService`] the user directory. Services delegate atomic units of work
//! to the persistence stores and emit events through the
//! [`super::domain::EventBus`] after they commit.

pub mod consultation_service;
pub mod ledger_service;
pub mod user_service;

pub use consultation_service::{BookingRequest, ConsultationService};
pub use ledger_service::{InitiatedPayment, LedgerService, SponsorshipDetail, WebhookOutcome};
pub use user_service::UserService;
