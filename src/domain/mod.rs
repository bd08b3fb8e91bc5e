//! Domain layer: identifiers, money, aggregates and the event system.
//!
//! Aggregates own their rules (funding thresholds, transition tables, call
//! durations). Stores call into them inside a unit of work; services publish
//! [`LedgerEvent`]s through the [`EventBus`] after commit.

pub mod call;
pub mod consultation;
pub mod event_bus;
pub mod ids;
pub mod ledger_event;
pub mod money;
pub mod sponsorship;
pub mod transaction;
pub mod user;

pub use call::{Call, CallModality, CallStats, CallStatus, MAX_CALL_DURATION_SECS};
pub use consultation::{
    Consultation, ConsultationMode, ConsultationStatus, NewConsultation, Participant,
};
pub use event_bus::EventBus;
pub use ids::{CallId, ConsultationId, SponsorshipId, TransactionId, UserId};
pub use ledger_event::LedgerEvent;
pub use money::{Amount, ParseAmountError};
pub use sponsorship::{FundingChange, FundingStats, NewSponsorship, Sponsorship, SponsorshipStatus};
pub use transaction::{DonationHistory, MethodStats, PaymentMethod, Transaction, TransactionStatus};
pub use user::{Actor, NewUser, Role, UserProfile};
