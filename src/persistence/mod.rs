//! Persistence layer: store traits and their PostgreSQL / in-memory backends.
//!
//! Each store method that changes a sponsorship total or a consultation
//! status is one atomic unit of work: the aggregate row is locked, the
//! domain rule is applied, and every write commits together. The rules
//! themselves live on the aggregates; the helpers in this module are shared
//! by both backends so the two cannot drift apart.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Amount, Call, CallId, CallModality, CallStatus, Consultation, ConsultationId, ConsultationStatus,
    FundingChange, MethodStats, PaymentMethod, Sponsorship, SponsorshipId, SponsorshipStatus,
    Transaction, TransactionId, TransactionStatus, UserId, UserProfile,
};
use crate::error::HealthPalError;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// A donation to be written by [`LedgerStore::record_donation`].
#[derive(Debug, Clone)]
pub struct DonationDraft {
    /// Target sponsorship.
    pub sponsorship_id: SponsorshipId,
    /// Donor.
    pub donor_id: UserId,
    /// Amount (strictly positive).
    pub amount: Amount,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// `completed` (credited now) or `pending` (credited on settlement).
    pub status: TransactionStatus,
    /// Gateway reference; replays of the same reference are idempotent.
    pub external_payment_ref: Option<String>,
    /// Gateway receipt link.
    pub receipt_url: Option<String>,
}

/// Result of [`LedgerStore::record_donation`].
#[derive(Debug, Clone)]
pub struct RecordedDonation {
    /// The written (or replayed) transaction.
    pub transaction: Transaction,
    /// Sponsorship state after the unit of work.
    pub sponsorship: Sponsorship,
    /// Credit applied, if the transaction was completed and new.
    pub change: Option<FundingChange>,
    /// The external reference had already been recorded.
    pub replayed: bool,
}

/// Outcome reported by the payment gateway for a pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Funds captured.
    Succeeded,
    /// Payment failed.
    Failed,
}

/// Result of [`LedgerStore::settle_payment`].
#[derive(Debug, Clone)]
pub struct SettledPayment {
    /// Transaction after settlement.
    pub transaction: Transaction,
    /// Sponsorship after settlement.
    pub sponsorship: Sponsorship,
    /// Credit applied on success.
    pub change: Option<FundingChange>,
    /// `false` when the transaction had already left `pending`.
    pub applied: bool,
}

/// Result of [`LedgerStore::refund_transaction`].
#[derive(Debug, Clone)]
pub struct RefundedDonation {
    /// The refunded transaction.
    pub transaction: Transaction,
    /// Sponsorship after the debit.
    pub sponsorship: Sponsorship,
    /// Debit applied.
    pub change: FundingChange,
}

/// Result of [`ConsultationStore::start_call`].
#[derive(Debug, Clone)]
pub struct StartedCall {
    /// The new active call.
    pub call: Call,
    /// Consultation after the unit of work.
    pub consultation: Consultation,
    /// Calls of the same modality that were still active and got completed.
    pub force_ended: Vec<Call>,
}

/// Result of [`ConsultationStore::end_call`].
#[derive(Debug, Clone)]
pub struct EndedCall {
    /// The completed call.
    pub call: Call,
    /// Consultation after the unit of work.
    pub consultation: Consultation,
}

/// Sponsorship and transaction storage.
#[async_trait]
pub trait LedgerStore: Send + Sync + fmt::Debug {
    /// Inserts a new sponsorship.
    async fn insert_sponsorship(&self, sponsorship: &Sponsorship) -> Result<(), HealthPalError>;

    /// Loads one sponsorship.
    async fn get_sponsorship(
        &self,
        id: SponsorshipId,
    ) -> Result<Option<Sponsorship>, HealthPalError>;

    /// Lists sponsorships, newest first, optionally filtered by status.
    async fn list_sponsorships(
        &self,
        status: Option<SponsorshipStatus>,
    ) -> Result<Vec<Sponsorship>, HealthPalError>;

    /// Closes a sponsorship under its row lock.
    async fn close_sponsorship(&self, id: SponsorshipId) -> Result<Sponsorship, HealthPalError>;

    /// Records a donation atomically: lock the sponsorship, replay check on
    /// the external reference, funding rule, insert, persist the total.
    async fn record_donation(
        &self,
        draft: DonationDraft,
        now: DateTime<Utc>,
    ) -> Result<RecordedDonation, HealthPalError>;

    /// Settles the pending transaction carrying `external_ref`. Returns
    /// `None` if no transaction carries it.
    async fn settle_payment(
        &self,
        external_ref: &str,
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<Option<SettledPayment>, HealthPalError>;

    /// Refunds a completed transaction and debits its sponsorship.
    async fn refund_transaction(
        &self,
        id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<RefundedDonation, HealthPalError>;

    /// Loads one transaction.
    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, HealthPalError>;

    /// Finds the transaction carrying a gateway reference.
    async fn find_transaction_by_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Transaction>, HealthPalError>;

    /// Lists a sponsorship's transactions (all statuses), newest first.
    async fn list_sponsorship_transactions(
        &self,
        sponsorship_id: SponsorshipId,
    ) -> Result<Vec<Transaction>, HealthPalError>;

    /// Lists a donor's transactions (all statuses), newest first.
    async fn list_donor_transactions(
        &self,
        donor_id: UserId,
    ) -> Result<Vec<Transaction>, HealthPalError>;

    /// Completed-donation figures grouped by payment method.
    async fn method_stats(&self) -> Result<Vec<MethodStats>, HealthPalError>;
}

/// Consultation and call storage.
#[async_trait]
pub trait ConsultationStore: Send + Sync + fmt::Debug {
    /// Inserts a new consultation.
    async fn insert_consultation(&self, consultation: &Consultation)
    -> Result<(), HealthPalError>;

    /// Loads one consultation.
    async fn get_consultation(
        &self,
        id: ConsultationId,
    ) -> Result<Option<Consultation>, HealthPalError>;

    /// Lists the consultations where `user` is the patient or the doctor,
    /// ordered by scheduled time.
    async fn list_consultations_for(
        &self,
        user: UserId,
    ) -> Result<Vec<Consultation>, HealthPalError>;

    /// Applies a status change requested by `actor` under the row lock.
    /// Moving to a status that does not allow calls completes every call
    /// still active, in the same unit of work.
    async fn update_consultation_status(
        &self,
        id: ConsultationId,
        actor: UserId,
        next: ConsultationStatus,
        now: DateTime<Utc>,
    ) -> Result<Consultation, HealthPalError>;

    /// Starts a call: completes any active call of the same modality,
    /// inserts the new call and moves the consultation to `in_progress`.
    async fn start_call(
        &self,
        consultation_id: ConsultationId,
        initiator: UserId,
        modality: CallModality,
        now: DateTime<Utc>,
    ) -> Result<StartedCall, HealthPalError>;

    /// Ends a call and completes the consultation. Without `call_id` the
    /// active call of `modality` is ended.
    async fn end_call(
        &self,
        consultation_id: ConsultationId,
        modality: CallModality,
        actor: UserId,
        call_id: Option<CallId>,
        duration_seconds: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<EndedCall, HealthPalError>;

    /// Lists a consultation's calls of one modality, newest first.
    async fn list_calls(
        &self,
        consultation_id: ConsultationId,
        modality: CallModality,
    ) -> Result<Vec<Call>, HealthPalError>;

    /// Lists every call started by `initiator`.
    async fn list_calls_by_initiator(&self, initiator: UserId)
    -> Result<Vec<Call>, HealthPalError>;
}

/// User directory storage.
#[async_trait]
pub trait UserStore: Send + Sync + fmt::Debug {
    /// Inserts a user; a taken email is a [`HealthPalError::Duplicate`].
    async fn insert_user(&self, user: &UserProfile) -> Result<(), HealthPalError>;

    /// Loads one user.
    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>, HealthPalError>;
}

/// Checks that an already-recorded transaction is a true replay of `draft`.
pub(crate) fn check_replay(
    existing: &Transaction,
    draft: &DonationDraft,
) -> Result<(), HealthPalError> {
    let same = existing.sponsorship_id == draft.sponsorship_id
        && existing.donor_id == draft.donor_id
        && existing.amount == draft.amount;
    if same {
        Ok(())
    } else {
        Err(HealthPalError::Duplicate(format!(
            "payment reference {} already recorded for another donation",
            existing.external_payment_ref.as_deref().unwrap_or_default()
        )))
    }
}

/// Applies `draft` to the locked `sponsorship` and builds the transaction to
/// insert.
///
/// Gateway card drafts carry money the gateway already captured, so they
/// are credited even when the campaign was funded or closed after the
/// payment was initiated.
pub(crate) fn apply_draft(
    sponsorship: &mut Sponsorship,
    draft: &DonationDraft,
    now: DateTime<Utc>,
) -> Result<(Transaction, Option<FundingChange>), HealthPalError> {
    let captured = draft.payment_method == PaymentMethod::GatewayCard;
    if !draft.amount.is_positive() {
        return Err(HealthPalError::InvalidAmount(
            "amount must be positive".to_string(),
        ));
    }
    let change = match draft.status {
        TransactionStatus::Completed if captured => Some(sponsorship.credit(draft.amount)?),
        TransactionStatus::Completed => Some(sponsorship.accept_donation(draft.amount)?),
        TransactionStatus::Pending => {
            if !captured {
                sponsorship.ensure_accepting()?;
            }
            None
        }
        other => {
            return Err(HealthPalError::Internal(format!(
                "cannot record a new donation as {other}"
            )));
        }
    };

    let mut transaction = Transaction::new(
        draft.sponsorship_id,
        draft.donor_id,
        draft.amount,
        draft.payment_method,
        draft.external_payment_ref.clone(),
        now,
    );
    transaction.status = draft.status;
    transaction.receipt_url.clone_from(&draft.receipt_url);
    Ok((transaction, change))
}

/// Applies a gateway settlement to a locked pending transaction. Returns
/// `(applied, credit)`; nothing changes when the transaction already left
/// `pending`.
pub(crate) fn apply_settlement(
    transaction: &mut Transaction,
    sponsorship: &mut Sponsorship,
    settlement: Settlement,
    now: DateTime<Utc>,
) -> Result<(bool, Option<FundingChange>), HealthPalError> {
    if transaction.status != TransactionStatus::Pending {
        return Ok((false, None));
    }
    match settlement {
        Settlement::Succeeded => {
            transaction.transition(TransactionStatus::Completed, now)?;
            Ok((true, Some(sponsorship.credit(transaction.amount)?)))
        }
        Settlement::Failed => {
            transaction.transition(TransactionStatus::Failed, now)?;
            Ok((true, None))
        }
    }
}

/// Refunds a locked completed transaction and debits its sponsorship.
pub(crate) fn apply_refund(
    transaction: &mut Transaction,
    sponsorship: &mut Sponsorship,
    now: DateTime<Utc>,
) -> Result<FundingChange, HealthPalError> {
    transaction.transition(TransactionStatus::Refunded, now)?;
    sponsorship.debit(transaction.amount)
}

/// Picks the call an end request refers to among the consultation's calls
/// of `modality`.
pub(crate) fn select_call_to_end(
    calls: Vec<Call>,
    call_id: Option<CallId>,
    consultation_id: ConsultationId,
    modality: CallModality,
) -> Result<Call, HealthPalError> {
    let found = match call_id {
        Some(id) => calls.into_iter().find(|c| c.id == id),
        None => calls.into_iter().find(|c| c.status == CallStatus::Active),
    };
    found.ok_or_else(|| match call_id {
        Some(id) => HealthPalError::not_found("call", id),
        None => HealthPalError::not_found(
            "call",
            format!("active {modality} call in consultation {consultation_id}"),
        ),
    })
}

/// Completes the consultation after its call ended, unless it already is.
pub(crate) fn complete_after_call(consultation: &mut Consultation) -> Result<(), HealthPalError> {
    if consultation.status == ConsultationStatus::Completed {
        return Ok(());
    }
    consultation.transition(ConsultationStatus::Completed)
}
