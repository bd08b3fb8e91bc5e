//! In-process store used when persistence is disabled and in tests.
//!
//! A single [`tokio::sync::Mutex`] serializes every unit of work. Each
//! mutation works on copies of the affected records and writes them back only
//! once every rule passed, so a failed operation leaves the state untouched.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    ConsultationStore, DonationDraft, EndedCall, LedgerStore, RecordedDonation, RefundedDonation,
    SettledPayment, Settlement, StartedCall, UserStore, apply_draft, apply_refund,
    apply_settlement, check_replay, complete_after_call, select_call_to_end,
};
use crate::domain::{
    Call, CallId, CallModality, CallStatus, Consultation, ConsultationId, ConsultationStatus,
    MethodStats, Sponsorship, SponsorshipId, SponsorshipStatus, Transaction, TransactionId,
    UserId, UserProfile,
};
use crate::error::HealthPalError;

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, UserProfile>,
    // Vecs keep insertion order so equal timestamps still list newest first.
    sponsorships: Vec<Sponsorship>,
    transactions: Vec<Transaction>,
    consultations: HashMap<ConsultationId, Consultation>,
    calls: Vec<Call>,
}

impl State {
    fn sponsorship(&self, id: SponsorshipId) -> Result<Sponsorship, HealthPalError> {
        self.sponsorships
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| HealthPalError::not_found("sponsorship", id))
    }

    fn put_sponsorship(&mut self, sponsorship: Sponsorship) {
        if let Some(slot) = self.sponsorships.iter_mut().find(|s| s.id == sponsorship.id) {
            *slot = sponsorship;
        }
    }

    fn transaction(&self, id: TransactionId) -> Result<Transaction, HealthPalError> {
        self.transactions
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| HealthPalError::not_found("transaction", id))
    }

    fn transaction_by_ref(&self, external_ref: &str) -> Option<Transaction> {
        self.transactions
            .iter()
            .find(|t| t.external_payment_ref.as_deref() == Some(external_ref))
            .cloned()
    }

    fn put_transaction(&mut self, transaction: Transaction) {
        if let Some(slot) = self.transactions.iter_mut().find(|t| t.id == transaction.id) {
            *slot = transaction;
        }
    }

    fn consultation(&self, id: ConsultationId) -> Result<Consultation, HealthPalError> {
        self.consultations
            .get(&id)
            .cloned()
            .ok_or_else(|| HealthPalError::not_found("consultation", id))
    }

    fn calls_for(&self, consultation_id: ConsultationId, modality: CallModality) -> Vec<Call> {
        let mut calls: Vec<Call> = self
            .calls
            .iter()
            .rev()
            .filter(|c| c.consultation_id == consultation_id && c.modality == modality)
            .cloned()
            .collect();
        calls.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        calls
    }

    fn put_call(&mut self, call: Call) {
        if let Some(slot) = self.calls.iter_mut().find(|c| c.id == call.id) {
            *slot = call;
        }
    }
}

fn newest_first(mut transactions: Vec<Transaction>) -> Vec<Transaction> {
    transactions.reverse();
    transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    transactions
}

/// Mutex-guarded in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_sponsorship(&self, sponsorship: &Sponsorship) -> Result<(), HealthPalError> {
        let mut state = self.state.lock().await;
        if state.sponsorships.iter().any(|s| s.id == sponsorship.id) {
            return Err(HealthPalError::Duplicate(format!(
                "sponsorship {}",
                sponsorship.id
            )));
        }
        state.sponsorships.push(sponsorship.clone());
        Ok(())
    }

    async fn get_sponsorship(
        &self,
        id: SponsorshipId,
    ) -> Result<Option<Sponsorship>, HealthPalError> {
        let state = self.state.lock().await;
        Ok(state.sponsorships.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sponsorships(
        &self,
        status: Option<SponsorshipStatus>,
    ) -> Result<Vec<Sponsorship>, HealthPalError> {
        let state = self.state.lock().await;
        let mut listed: Vec<Sponsorship> = state
            .sponsorships
            .iter()
            .rev()
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    async fn close_sponsorship(&self, id: SponsorshipId) -> Result<Sponsorship, HealthPalError> {
        let mut state = self.state.lock().await;
        let mut sponsorship = state.sponsorship(id)?;
        sponsorship.close()?;
        state.put_sponsorship(sponsorship.clone());
        Ok(sponsorship)
    }

    async fn record_donation(
        &self,
        draft: DonationDraft,
        now: DateTime<Utc>,
    ) -> Result<RecordedDonation, HealthPalError> {
        let mut state = self.state.lock().await;
        let mut sponsorship = state.sponsorship(draft.sponsorship_id)?;

        let existing = draft
            .external_payment_ref
            .as_deref()
            .and_then(|r| state.transaction_by_ref(r));
        if let Some(existing) = existing {
            check_replay(&existing, &draft)?;
            return Ok(RecordedDonation {
                transaction: existing,
                sponsorship,
                change: None,
                replayed: true,
            });
        }

        let (transaction, change) = apply_draft(&mut sponsorship, &draft, now)?;
        state.transactions.push(transaction.clone());
        state.put_sponsorship(sponsorship.clone());

        Ok(RecordedDonation {
            transaction,
            sponsorship,
            change,
            replayed: false,
        })
    }

    async fn settle_payment(
        &self,
        external_ref: &str,
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<Option<SettledPayment>, HealthPalError> {
        let mut state = self.state.lock().await;
        let Some(mut transaction) = state.transaction_by_ref(external_ref) else {
            return Ok(None);
        };
        let mut sponsorship = state.sponsorship(transaction.sponsorship_id)?;

        let (applied, change) =
            apply_settlement(&mut transaction, &mut sponsorship, settlement, now)?;
        if applied {
            state.put_transaction(transaction.clone());
            state.put_sponsorship(sponsorship.clone());
        }

        Ok(Some(SettledPayment {
            transaction,
            sponsorship,
            change,
            applied,
        }))
    }

    async fn refund_transaction(
        &self,
        id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<RefundedDonation, HealthPalError> {
        let mut state = self.state.lock().await;
        let mut transaction = state.transaction(id)?;
        let mut sponsorship = state.sponsorship(transaction.sponsorship_id)?;

        let change = apply_refund(&mut transaction, &mut sponsorship, now)?;
        state.put_transaction(transaction.clone());
        state.put_sponsorship(sponsorship.clone());

        Ok(RefundedDonation {
            transaction,
            sponsorship,
            change,
        })
    }

    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, HealthPalError> {
        let state = self.state.lock().await;
        Ok(state.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn find_transaction_by_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Transaction>, HealthPalError> {
        Ok(self.state.lock().await.transaction_by_ref(external_ref))
    }

    async fn list_sponsorship_transactions(
        &self,
        sponsorship_id: SponsorshipId,
    ) -> Result<Vec<Transaction>, HealthPalError> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .transactions
                .iter()
                .filter(|t| t.sponsorship_id == sponsorship_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_donor_transactions(
        &self,
        donor_id: UserId,
    ) -> Result<Vec<Transaction>, HealthPalError> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .transactions
                .iter()
                .filter(|t| t.donor_id == donor_id)
                .cloned()
                .collect(),
        ))
    }

    async fn method_stats(&self) -> Result<Vec<MethodStats>, HealthPalError> {
        let state = self.state.lock().await;
        Ok(MethodStats::from_transactions(&state.transactions))
    }
}

#[async_trait]
impl ConsultationStore for MemoryStore {
    async fn insert_consultation(
        &self,
        consultation: &Consultation,
    ) -> Result<(), HealthPalError> {
        let mut state = self.state.lock().await;
        state
            .consultations
            .insert(consultation.id, consultation.clone());
        Ok(())
    }

    async fn get_consultation(
        &self,
        id: ConsultationId,
    ) -> Result<Option<Consultation>, HealthPalError> {
        Ok(self.state.lock().await.consultations.get(&id).cloned())
    }

    async fn list_consultations_for(
        &self,
        user: UserId,
    ) -> Result<Vec<Consultation>, HealthPalError> {
        let state = self.state.lock().await;
        let mut listed: Vec<Consultation> = state
            .consultations
            .values()
            .filter(|c| c.participant(user).is_some())
            .cloned()
            .collect();
        listed.sort_by(|a, b| {
            a.scheduled_time
                .cmp(&b.scheduled_time)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(listed)
    }

    async fn update_consultation_status(
        &self,
        id: ConsultationId,
        actor: UserId,
        next: ConsultationStatus,
        now: DateTime<Utc>,
    ) -> Result<Consultation, HealthPalError> {
        let mut state = self.state.lock().await;
        let mut consultation = state.consultation(id)?;
        consultation.change_status(actor, next)?;

        if !next.allows_calls() {
            let mut stale: Vec<Call> = [CallModality::Audio, CallModality::Video]
                .into_iter()
                .flat_map(|m| state.calls_for(id, m))
                .filter(|c| c.status == CallStatus::Active)
                .collect();
            for call in &mut stale {
                call.finish(now, None)?;
                tracing::warn!(
                    consultation_id = %id,
                    call_id = %call.id,
                    %next,
                    "ended active call on status change"
                );
            }
            for call in stale {
                state.put_call(call);
            }
        }

        state.consultations.insert(id, consultation.clone());
        Ok(consultation)
    }

    async fn start_call(
        &self,
        consultation_id: ConsultationId,
        initiator: UserId,
        modality: CallModality,
        now: DateTime<Utc>,
    ) -> Result<StartedCall, HealthPalError> {
        let mut state = self.state.lock().await;
        let mut consultation = state.consultation(consultation_id)?;
        consultation.check_call_start(initiator, modality)?;

        let mut force_ended: Vec<Call> = state
            .calls_for(consultation_id, modality)
            .into_iter()
            .filter(|c| c.status == CallStatus::Active)
            .collect();
        for stale in &mut force_ended {
            stale.finish(now, None)?;
            tracing::warn!(
                %consultation_id,
                call_id = %stale.id,
                %modality,
                "force-ended active call before starting a new one"
            );
        }
        consultation.mark_in_progress()?;

        let call = Call::start(consultation_id, initiator, modality, now);
        for stale in &force_ended {
            state.put_call(stale.clone());
        }
        state.calls.push(call.clone());
        state
            .consultations
            .insert(consultation_id, consultation.clone());

        Ok(StartedCall {
            call,
            consultation,
            force_ended,
        })
    }

    async fn end_call(
        &self,
        consultation_id: ConsultationId,
        modality: CallModality,
        actor: UserId,
        call_id: Option<CallId>,
        duration_seconds: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<EndedCall, HealthPalError> {
        let mut state = self.state.lock().await;
        let mut consultation = state.consultation(consultation_id)?;
        consultation.require_participant(actor)?;

        let calls = state.calls_for(consultation_id, modality);
        let mut call = select_call_to_end(calls, call_id, consultation_id, modality)?;
        call.finish(now, duration_seconds)?;
        complete_after_call(&mut consultation)?;

        state.put_call(call.clone());
        state
            .consultations
            .insert(consultation_id, consultation.clone());

        Ok(EndedCall { call, consultation })
    }

    async fn list_calls(
        &self,
        consultation_id: ConsultationId,
        modality: CallModality,
    ) -> Result<Vec<Call>, HealthPalError> {
        Ok(self.state.lock().await.calls_for(consultation_id, modality))
    }

    async fn list_calls_by_initiator(
        &self,
        initiator: UserId,
    ) -> Result<Vec<Call>, HealthPalError> {
        let state = self.state.lock().await;
        Ok(state
            .calls
            .iter()
            .filter(|c| c.initiator_id == initiator)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &UserProfile) -> Result<(), HealthPalError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(HealthPalError::Duplicate(format!("email {}", user.email)));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>, HealthPalError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{
        Amount, ConsultationMode, NewConsultation, NewSponsorship, PaymentMethod,
        TransactionStatus,
    };

    async fn seeded(goal_cents: i64) -> (MemoryStore, Sponsorship) {
        let store = MemoryStore::new();
        let Ok(sponsorship) = Sponsorship::open(
            NewSponsorship {
                beneficiary_id: UserId::new(),
                treatment_type: "insulin".to_string(),
                goal_amount: Amount::from_cents(goal_cents),
                description: "one year supply".to_string(),
            },
            Utc::now(),
        ) else {
            panic!("valid sponsorship");
        };
        assert!(store.insert_sponsorship(&sponsorship).await.is_ok());
        (store, sponsorship)
    }

    fn draft(sponsorship_id: SponsorshipId, cents: i64, reference: Option<&str>) -> DonationDraft {
        DonationDraft {
            sponsorship_id,
            donor_id: UserId::new(),
            amount: Amount::from_cents(cents),
            payment_method: if reference.is_some() {
                PaymentMethod::GatewayCard
            } else {
                PaymentMethod::Card
            },
            status: TransactionStatus::Completed,
            external_payment_ref: reference.map(str::to_string),
            receipt_url: None,
        }
    }

    #[tokio::test]
    async fn rejected_donation_leaves_state_unchanged() {
        let (store, sponsorship) = seeded(1_000).await;
        let first = store
            .record_donation(draft(sponsorship.id, 1_000, None), Utc::now())
            .await;
        assert!(first.is_ok_and(|r| r.change.is_some_and(|c| c.became_funded)));

        let second = store
            .record_donation(draft(sponsorship.id, 10, None), Utc::now())
            .await;
        assert!(matches!(second, Err(HealthPalError::AlreadyFunded(_))));

        let Ok(rows) = store.list_sponsorship_transactions(sponsorship.id).await else {
            panic!("listing works");
        };
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn captured_gateway_funds_bypass_acceptance() {
        let (store, sponsorship) = seeded(1_000).await;
        let Ok(_) = store
            .record_donation(draft(sponsorship.id, 1_000, None), Utc::now())
            .await
        else {
            panic!("direct donation funds");
        };

        let Ok(late) = store
            .record_donation(draft(sponsorship.id, 250, Some("pi_late")), Utc::now())
            .await
        else {
            panic!("captured payment credited");
        };
        assert!(late.change.is_some_and(|c| !c.became_funded));
        assert_eq!(late.sponsorship.donated_amount, Amount::from_cents(1_250));

        let direct = store
            .record_donation(draft(sponsorship.id, 250, None), Utc::now())
            .await;
        assert!(matches!(direct, Err(HealthPalError::AlreadyFunded(_))));
    }

    #[tokio::test]
    async fn replayed_reference_is_idempotent() {
        let (store, sponsorship) = seeded(10_000).await;
        let original = draft(sponsorship.id, 2_500, Some("pi_123"));

        let Ok(first) = store.record_donation(original.clone(), Utc::now()).await else {
            panic!("first confirmation");
        };
        let Ok(again) = store.record_donation(original, Utc::now()).await else {
            panic!("replay");
        };
        assert!(!first.replayed);
        assert!(again.replayed);
        assert_eq!(first.transaction.id, again.transaction.id);
        assert_eq!(again.sponsorship.donated_amount, Amount::from_cents(2_500));

        let mismatched = store
            .record_donation(draft(sponsorship.id, 999, Some("pi_123")), Utc::now())
            .await;
        assert!(matches!(mismatched, Err(HealthPalError::Duplicate(_))));
    }

    #[tokio::test]
    async fn settlement_credits_once() {
        let (store, sponsorship) = seeded(10_000).await;
        let pending = DonationDraft {
            status: TransactionStatus::Pending,
            ..draft(sponsorship.id, 4_000, Some("pi_pending"))
        };
        let Ok(recorded) = store.record_donation(pending, Utc::now()).await else {
            panic!("pending recorded");
        };
        assert_eq!(recorded.sponsorship.donated_amount, Amount::ZERO);

        let Ok(Some(settled)) = store
            .settle_payment("pi_pending", Settlement::Succeeded, Utc::now())
            .await
        else {
            panic!("settled");
        };
        assert!(settled.applied);
        assert_eq!(settled.sponsorship.donated_amount, Amount::from_cents(4_000));

        let Ok(Some(replay)) = store
            .settle_payment("pi_pending", Settlement::Succeeded, Utc::now())
            .await
        else {
            panic!("replayed settlement");
        };
        assert!(!replay.applied);
        assert_eq!(replay.sponsorship.donated_amount, Amount::from_cents(4_000));

        let unknown = store
            .settle_payment("pi_unknown", Settlement::Failed, Utc::now())
            .await;
        assert!(matches!(unknown, Ok(None)));
    }

    #[tokio::test]
    async fn refund_reopens_funded_campaign() {
        let (store, sponsorship) = seeded(1_000).await;
        let Ok(recorded) = store
            .record_donation(draft(sponsorship.id, 1_200, None), Utc::now())
            .await
        else {
            panic!("donation");
        };
        let Ok(refunded) = store
            .refund_transaction(recorded.transaction.id, Utc::now())
            .await
        else {
            panic!("refund");
        };
        assert!(refunded.change.reopened);
        assert_eq!(refunded.sponsorship.status, SponsorshipStatus::Open);
        assert_eq!(refunded.sponsorship.donated_amount, Amount::ZERO);

        let twice = store
            .refund_transaction(recorded.transaction.id, Utc::now())
            .await;
        assert!(matches!(twice, Err(HealthPalError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn second_call_force_ends_first() {
        let store = MemoryStore::new();
        let Ok(mut consultation) = Consultation::book(
            NewConsultation {
                patient_id: UserId::new(),
                doctor_id: UserId::new(),
                scheduled_time: Utc::now(),
                mode: ConsultationMode::Audio,
                notes: None,
            },
            Utc::now(),
        ) else {
            panic!("booking");
        };
        consultation.status = ConsultationStatus::Accepted;
        assert!(store.insert_consultation(&consultation).await.is_ok());

        let Ok(first) = store
            .start_call(
                consultation.id,
                consultation.patient_id,
                CallModality::Audio,
                Utc::now(),
            )
            .await
        else {
            panic!("first call");
        };
        assert_eq!(first.consultation.status, ConsultationStatus::InProgress);

        let Ok(second) = store
            .start_call(
                consultation.id,
                consultation.doctor_id,
                CallModality::Audio,
                Utc::now(),
            )
            .await
        else {
            panic!("second call");
        };
        assert_eq!(second.force_ended.len(), 1);

        let Ok(calls) = store
            .list_calls(consultation.id, CallModality::Audio)
            .await
        else {
            panic!("listing");
        };
        let active = calls
            .iter()
            .filter(|c| c.status == CallStatus::Active)
            .count();
        assert_eq!(active, 1);
        assert!(
            calls
                .iter()
                .any(|c| c.id == first.call.id && c.status == CallStatus::Completed)
        );
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        let user = |email: &str| UserProfile {
            id: UserId::new(),
            full_name: "Sam".to_string(),
            email: email.to_string(),
            phone: None,
            role: crate::domain::Role::Donor,
            created_at: Utc::now(),
        };
        assert!(store.insert_user(&user("sam@example.org")).await.is_ok());
        assert!(matches!(
            store.insert_user(&user("sam@example.org")).await,
            Err(HealthPalError::Duplicate(_))
        ));
    }
}
