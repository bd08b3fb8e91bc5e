//! Ledger service: sponsorships, donations, staged payments and refunds.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{
    Actor, Amount, DonationHistory, EventBus, FundingChange, FundingStats, LedgerEvent,
    MethodStats, NewSponsorship, PaymentMethod, Sponsorship, SponsorshipId, SponsorshipStatus,
    Transaction, TransactionId, TransactionStatus, UserId,
};
use crate::error::HealthPalError;
use crate::payment::{GatewayEvent, IntentRequest, IntentStatus, PaymentGateway, verify_signature};
use crate::persistence::{DonationDraft, LedgerStore, RecordedDonation, RefundedDonation, Settlement};

/// A sponsorship with its completed donations and their statistics.
#[derive(Debug, Clone)]
pub struct SponsorshipDetail {
    /// The campaign.
    pub sponsorship: Sponsorship,
    /// Completed donations, newest first.
    pub donations: Vec<Transaction>,
    /// Figures over `donations`.
    pub stats: FundingStats,
}

/// A payment intent handed back to the donor's client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedPayment {
    /// Secret the client completes the payment with.
    pub client_secret: Option<String>,
    /// Gateway handle to confirm with.
    pub payment_intent_id: String,
    /// Amount to be charged.
    pub amount: Amount,
}

/// What a webhook delivery did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A pending transaction was settled.
    Settled,
    /// A completed transaction was refunded.
    Refunded,
    /// Already applied, or nothing to apply.
    NoOp,
    /// The event type has no ledger effect.
    Ignored,
}

/// Webhook verification settings.
#[derive(Debug, Clone)]
struct WebhookSettings {
    secret: Option<String>,
    tolerance_secs: i64,
}

/// Orchestration layer for the donation ledger.
///
/// Every mutation goes through one atomic [`LedgerStore`] call; events are
/// published on the [`EventBus`] only after that call returned, and gateway
/// calls happen before it.
#[derive(Debug, Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    event_bus: EventBus,
    currency: String,
    webhook: WebhookSettings,
}

impl LedgerService {
    /// Creates a new `LedgerService` charging in USD with webhook signature
    /// checks disabled.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            gateway,
            event_bus,
            currency: "usd".to_string(),
            webhook: WebhookSettings {
                secret: None,
                tolerance_secs: 300,
            },
        }
    }

    /// Sets the currency used for new payment intents.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Enables webhook signature verification.
    #[must_use]
    pub fn with_webhook_secret(mut self, secret: Option<String>, tolerance_secs: i64) -> Self {
        self.webhook = WebhookSettings {
            secret,
            tolerance_secs,
        };
        self
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Opens a new campaign for `new.beneficiary_id`.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`Sponsorship::open`] or a store error.
    pub async fn create_sponsorship(
        &self,
        new: NewSponsorship,
    ) -> Result<Sponsorship, HealthPalError> {
        let sponsorship = Sponsorship::open(new, Utc::now())?;
        self.store.insert_sponsorship(&sponsorship).await?;
        tracing::info!(
            sponsorship_id = %sponsorship.id,
            beneficiary_id = %sponsorship.beneficiary_id,
            goal = %sponsorship.goal_amount,
            "sponsorship created"
        );
        Ok(sponsorship)
    }

    /// Lists campaigns still accepting donations, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn list_open(&self) -> Result<Vec<Sponsorship>, HealthPalError> {
        self.store
            .list_sponsorships(Some(SponsorshipStatus::Open))
            .await
    }

    /// Loads a campaign with its completed donations and statistics.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::NotFound`] for unknown ids.
    pub async fn get_detail(&self, id: SponsorshipId) -> Result<SponsorshipDetail, HealthPalError> {
        let sponsorship = self.require_sponsorship(id).await?;
        let donations = self.completed_donations(id).await?;
        let stats = FundingStats::from_transactions(&donations);
        Ok(SponsorshipDetail {
            sponsorship,
            donations,
            stats,
        })
    }

    /// Closes a campaign. Allowed for its beneficiary and for admins.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::NotFound`], [`HealthPalError::Forbidden`] for
    /// other callers, or [`HealthPalError::InvalidTransition`] if already
    /// closed.
    pub async fn close(
        &self,
        id: SponsorshipId,
        actor: &Actor,
    ) -> Result<Sponsorship, HealthPalError> {
        let current = self.require_sponsorship(id).await?;
        if current.beneficiary_id != actor.id && !actor.is_admin() {
            return Err(HealthPalError::Forbidden(
                "only the beneficiary or an admin can close a sponsorship".to_string(),
            ));
        }
        let closed = self.store.close_sponsorship(id).await?;
        tracing::info!(sponsorship_id = %id, actor = %actor.id, "sponsorship closed");
        Ok(closed)
    }

    /// Records a direct card or bank donation.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidAmount`],
    /// [`HealthPalError::InvalidPaymentMethod`], [`HealthPalError::NotFound`],
    /// [`HealthPalError::SponsorshipClosed`] or
    /// [`HealthPalError::AlreadyFunded`]; nothing is written in those cases.
    pub async fn record_donation(
        &self,
        sponsorship_id: SponsorshipId,
        donor_id: UserId,
        amount: Amount,
        payment_method: &str,
    ) -> Result<RecordedDonation, HealthPalError> {
        if !amount.is_positive() {
            return Err(HealthPalError::InvalidAmount(
                "amount must be positive".to_string(),
            ));
        }
        let payment_method = PaymentMethod::parse_direct(payment_method)?;

        let recorded = self
            .store
            .record_donation(
                DonationDraft {
                    sponsorship_id,
                    donor_id,
                    amount,
                    payment_method,
                    status: TransactionStatus::Completed,
                    external_payment_ref: None,
                    receipt_url: None,
                },
                Utc::now(),
            )
            .await?;

        tracing::info!(
            transaction_id = %recorded.transaction.id,
            %sponsorship_id,
            %donor_id,
            %amount,
            %payment_method,
            "donation recorded"
        );
        if let Some(change) = recorded.change {
            self.publish_credit(&recorded.transaction, &recorded.sponsorship, change);
        }
        Ok(recorded)
    }

    /// A donor's completed donations with totals over the same rows.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn history(&self, donor_id: UserId) -> Result<DonationHistory, HealthPalError> {
        let rows = self.store.list_donor_transactions(donor_id).await?;
        Ok(DonationHistory::from_transactions(rows))
    }

    /// Completed donations of one campaign, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::NotFound`] for unknown campaigns.
    pub async fn sponsorship_donations(
        &self,
        id: SponsorshipId,
    ) -> Result<Vec<Transaction>, HealthPalError> {
        self.require_sponsorship(id).await?;
        self.completed_donations(id).await
    }

    /// Completed-donation figures per payment method.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn method_stats(&self) -> Result<Vec<MethodStats>, HealthPalError> {
        self.store.method_stats().await
    }

    /// Asks the gateway for a payment intent. The ledger is not touched.
    ///
    /// # Errors
    ///
    /// Returns the acceptance errors of [`Sponsorship::ensure_accepting`],
    /// [`HealthPalError::InvalidAmount`], [`HealthPalError::NotFound`] or
    /// [`HealthPalError::Payment`].
    pub async fn initiate_payment(
        &self,
        sponsorship_id: SponsorshipId,
        donor_id: UserId,
        amount: Amount,
    ) -> Result<InitiatedPayment, HealthPalError> {
        if !amount.is_positive() {
            return Err(HealthPalError::InvalidAmount(
                "amount must be positive".to_string(),
            ));
        }
        self.require_sponsorship(sponsorship_id)
            .await?
            .ensure_accepting()?;

        let intent = self
            .gateway
            .create_intent(&IntentRequest {
                amount,
                currency: self.currency.clone(),
                sponsorship_id,
                donor_id,
            })
            .await?;
        Ok(InitiatedPayment {
            client_secret: intent.client_secret,
            payment_intent_id: intent.id,
            amount: intent.amount,
        })
    }

    /// Records the donation behind a gateway payment.
    ///
    /// A succeeded intent becomes a completed `gateway_card` donation; a
    /// processing one a pending transaction settled later by webhook.
    /// Confirming the same handle again returns the first transaction.
    /// Captured funds are credited even if the campaign was funded or closed
    /// after the payment was initiated.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::PaymentNotCompleted`] for other intent
    /// states, [`HealthPalError::InvalidRequest`] when the amount differs from
    /// the intent, [`HealthPalError::Duplicate`] when the handle belongs to
    /// another donation, and [`HealthPalError::NotFound`] for an unknown
    /// campaign.
    pub async fn confirm_payment(
        &self,
        payment_handle: &str,
        sponsorship_id: SponsorshipId,
        donor_id: UserId,
        amount: Amount,
    ) -> Result<RecordedDonation, HealthPalError> {
        let intent = self.gateway.retrieve_intent(payment_handle).await?;
        let status = match intent.status {
            IntentStatus::Succeeded => TransactionStatus::Completed,
            IntentStatus::Processing => TransactionStatus::Pending,
            other => {
                return Err(HealthPalError::PaymentNotCompleted(format!(
                    "payment {payment_handle} is {other}"
                )));
            }
        };
        if intent.amount != amount {
            return Err(HealthPalError::InvalidRequest(format!(
                "amount {amount} does not match payment amount {}",
                intent.amount
            )));
        }

        let recorded = self
            .store
            .record_donation(
                DonationDraft {
                    sponsorship_id,
                    donor_id,
                    amount,
                    payment_method: PaymentMethod::GatewayCard,
                    status,
                    external_payment_ref: Some(payment_handle.to_string()),
                    receipt_url: intent.receipt_url,
                },
                Utc::now(),
            )
            .await?;

        if recorded.replayed {
            tracing::info!(
                transaction_id = %recorded.transaction.id,
                payment_handle,
                "payment confirmation replayed"
            );
        } else {
            tracing::info!(
                transaction_id = %recorded.transaction.id,
                %sponsorship_id,
                %donor_id,
                status = %recorded.transaction.status,
                "gateway payment recorded"
            );
        }
        if let Some(change) = recorded.change {
            self.publish_credit(&recorded.transaction, &recorded.sponsorship, change);
        }
        Ok(recorded)
    }

    /// Verifies and applies a gateway webhook delivery.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Unauthenticated`] for a missing or invalid
    /// signature, [`HealthPalError::InvalidRequest`] for a malformed body, or
    /// a store error.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, HealthPalError> {
        match self.webhook.secret.as_deref() {
            Some(secret) => {
                let header = signature.ok_or_else(|| {
                    HealthPalError::Unauthenticated("missing webhook signature".to_string())
                })?;
                verify_signature(
                    payload,
                    header,
                    secret,
                    self.webhook.tolerance_secs,
                    Utc::now().timestamp(),
                )?;
            }
            None => {
                tracing::warn!("webhook secret not configured, accepting unsigned delivery");
            }
        }

        match GatewayEvent::parse(payload)? {
            GatewayEvent::PaymentSucceeded { intent_id } => {
                self.settle(&intent_id, Settlement::Succeeded).await
            }
            GatewayEvent::PaymentFailed { intent_id } => {
                self.settle(&intent_id, Settlement::Failed).await
            }
            GatewayEvent::ChargeRefunded { intent_id } => self.refund_by_ref(&intent_id).await,
            GatewayEvent::Ignored { event_type } => {
                tracing::debug!(event_type, "webhook event ignored");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Refunds a completed donation. Gateway payments are refunded at the
    /// gateway first.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::NotFound`],
    /// [`HealthPalError::InvalidTransition`] unless the transaction is
    /// completed, or [`HealthPalError::Payment`] if the gateway refund fails.
    pub async fn refund(&self, id: TransactionId) -> Result<RefundedDonation, HealthPalError> {
        let transaction = self
            .store
            .get_transaction(id)
            .await?
            .ok_or_else(|| HealthPalError::not_found("transaction", id))?;
        if transaction.status != TransactionStatus::Completed {
            return Err(HealthPalError::InvalidTransition {
                entity: "transaction",
                from: transaction.status.to_string(),
                to: TransactionStatus::Refunded.to_string(),
            });
        }
        if transaction.payment_method == PaymentMethod::GatewayCard {
            if let Some(reference) = transaction.external_payment_ref.as_deref() {
                let refund_id = self.gateway.refund(reference).await?;
                tracing::info!(transaction_id = %id, refund_id = %refund_id, "gateway refund requested");
            }
        }

        let refunded = self.store.refund_transaction(id, Utc::now()).await?;
        self.publish_refund(&refunded);
        Ok(refunded)
    }

    async fn settle(
        &self,
        intent_id: &str,
        settlement: Settlement,
    ) -> Result<WebhookOutcome, HealthPalError> {
        let Some(settled) = self
            .store
            .settle_payment(intent_id, settlement, Utc::now())
            .await?
        else {
            tracing::warn!(intent_id, "webhook for unknown payment reference");
            return Ok(WebhookOutcome::NoOp);
        };
        if !settled.applied {
            tracing::debug!(intent_id, status = %settled.transaction.status, "settlement replayed");
            return Ok(WebhookOutcome::NoOp);
        }

        tracing::info!(
            transaction_id = %settled.transaction.id,
            intent_id,
            status = %settled.transaction.status,
            "payment settled"
        );
        if let Some(change) = settled.change {
            self.publish_credit(&settled.transaction, &settled.sponsorship, change);
        }
        Ok(WebhookOutcome::Settled)
    }

    async fn refund_by_ref(&self, intent_id: &str) -> Result<WebhookOutcome, HealthPalError> {
        let Some(transaction) = self.store.find_transaction_by_ref(intent_id).await? else {
            tracing::warn!(intent_id, "refund webhook for unknown payment reference");
            return Ok(WebhookOutcome::NoOp);
        };
        if transaction.status != TransactionStatus::Completed {
            tracing::debug!(
                transaction_id = %transaction.id,
                status = %transaction.status,
                "refund webhook has nothing to apply"
            );
            return Ok(WebhookOutcome::NoOp);
        }

        match self.store.refund_transaction(transaction.id, Utc::now()).await {
            Ok(refunded) => {
                self.publish_refund(&refunded);
                Ok(WebhookOutcome::Refunded)
            }
            Err(HealthPalError::InvalidTransition { .. }) => Ok(WebhookOutcome::NoOp),
            Err(e) => Err(e),
        }
    }

    async fn require_sponsorship(&self, id: SponsorshipId) -> Result<Sponsorship, HealthPalError> {
        self.store
            .get_sponsorship(id)
            .await?
            .ok_or_else(|| HealthPalError::not_found("sponsorship", id))
    }

    async fn completed_donations(
        &self,
        id: SponsorshipId,
    ) -> Result<Vec<Transaction>, HealthPalError> {
        let mut rows = self.store.list_sponsorship_transactions(id).await?;
        rows.retain(|t| t.status == TransactionStatus::Completed);
        Ok(rows)
    }

    fn publish_credit(
        &self,
        transaction: &Transaction,
        sponsorship: &Sponsorship,
        change: FundingChange,
    ) {
        let now = Utc::now();
        let _ = self.event_bus.publish(LedgerEvent::DonationRecorded {
            transaction_id: transaction.id,
            sponsorship_id: sponsorship.id,
            donor_id: transaction.donor_id,
            amount: transaction.amount,
            payment_method: transaction.payment_method,
            new_total: change.new_total,
            timestamp: now,
        });
        if change.became_funded {
            tracing::info!(
                sponsorship_id = %sponsorship.id,
                total = %change.new_total,
                goal = %sponsorship.goal_amount,
                "sponsorship fully funded"
            );
            let _ = self.event_bus.publish(LedgerEvent::SponsorshipFunded {
                sponsorship_id: sponsorship.id,
                beneficiary_id: sponsorship.beneficiary_id,
                goal_amount: sponsorship.goal_amount,
                donated_amount: change.new_total,
                timestamp: now,
            });
        }
    }

    fn publish_refund(&self, refunded: &RefundedDonation) {
        tracing::info!(
            transaction_id = %refunded.transaction.id,
            sponsorship_id = %refunded.sponsorship.id,
            amount = %refunded.transaction.amount,
            reopened = refunded.change.reopened,
            "donation refunded"
        );
        let _ = self.event_bus.publish(LedgerEvent::DonationRefunded {
            transaction_id: refunded.transaction.id,
            sponsorship_id: refunded.sponsorship.id,
            donor_id: refunded.transaction.donor_id,
            amount: refunded.transaction.amount,
            reopened: refunded.change.reopened,
            timestamp: Utc::now(),
        });
    }
}
