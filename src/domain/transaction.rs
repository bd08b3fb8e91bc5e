//! Donation transaction records.
//!
//! A [`Transaction`] is append-only: after creation only its `status` (and
//! `updated_at`) may change, and only along [`TransactionStatus::TRANSITIONS`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Amount, SponsorshipId, TransactionId, UserId};
use crate::error::HealthPalError;

/// Lifecycle status of a donation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting gateway settlement; not counted in the campaign total.
    Pending,
    /// Settled and counted.
    Completed,
    /// Gateway reported failure.
    Failed,
    /// Previously completed, money returned to the donor.
    Refunded,
}

impl TransactionStatus {
    /// Every permitted `(from, to)` status change.
    pub const TRANSITIONS: &'static [(Self, Self)] = &[
        (Self::Pending, Self::Completed),
        (Self::Pending, Self::Failed),
        (Self::Completed, Self::Refunded),
    ];

    /// Returns `true` if `self -> next` is in the transition table.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        Self::TRANSITIONS.contains(&(self, next))
    }

    /// Returns the storage / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = HealthPalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(HealthPalError::InvalidRequest(format!(
                "unknown transaction status: {other}"
            ))),
        }
    }
}

/// How a donation was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card payment recorded directly.
    Card,
    /// Bank transfer recorded directly.
    Bank,
    /// Card payment captured through the external payment gateway.
    GatewayCard,
}

impl PaymentMethod {
    /// Parses a method accepted by the direct donation path (`card` or
    /// `bank`, case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidPaymentMethod`] for anything else.
    pub fn parse_direct(raw: &str) -> Result<Self, HealthPalError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "card" => Ok(Self::Card),
            "bank" => Ok(Self::Bank),
            _ => Err(HealthPalError::InvalidPaymentMethod(format!(
                "payment method must be either \"card\" or \"bank\", got {raw:?}"
            ))),
        }
    }

    /// Returns the storage / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Bank => "bank",
            Self::GatewayCard => "gateway_card",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = HealthPalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(Self::Card),
            "bank" => Ok(Self::Bank),
            "gateway_card" => Ok(Self::GatewayCard),
            other => Err(HealthPalError::InvalidPaymentMethod(other.to_string())),
        }
    }
}

/// A single donation against a sponsorship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Transaction {
    /// Transaction identifier.
    #[schema(value_type = uuid::Uuid)]
    pub id: TransactionId,
    /// Campaign the donation belongs to (immutable).
    #[schema(value_type = uuid::Uuid)]
    pub sponsorship_id: SponsorshipId,
    /// Donor (immutable).
    #[schema(value_type = uuid::Uuid)]
    pub donor_id: UserId,
    /// Donated amount (immutable, strictly positive).
    #[schema(value_type = String, example = "25.00")]
    pub amount: Amount,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Lifecycle status.
    pub status: TransactionStatus,
    /// Gateway payment reference; unique across all transactions.
    pub external_payment_ref: Option<String>,
    /// Gateway receipt link, when one exists.
    pub receipt_url: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last status change.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds a `completed` transaction.
    #[must_use]
    pub fn new(
        sponsorship_id: SponsorshipId,
        donor_id: UserId,
        amount: Amount,
        payment_method: PaymentMethod,
        external_payment_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            sponsorship_id,
            donor_id,
            amount,
            payment_method,
            status: TransactionStatus::Completed,
            external_payment_ref,
            receipt_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the transaction to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidTransition`] if the change is not in
    /// the transition table.
    pub fn transition(
        &mut self,
        next: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), HealthPalError> {
        if !self.status.can_transition_to(next) {
            return Err(HealthPalError::InvalidTransition {
                entity: "transaction",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// A donor's completed donations with totals computed from the same rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationHistory {
    /// Completed transactions, newest first.
    pub transactions: Vec<Transaction>,
    /// Number of listed transactions.
    pub total_count: u64,
    /// Sum of the listed amounts.
    pub total_amount: Amount,
}

impl DonationHistory {
    /// Keeps completed rows, orders them newest first and derives the totals
    /// from exactly those rows.
    #[must_use]
    pub fn from_transactions(mut transactions: Vec<Transaction>) -> Self {
        transactions.retain(|t| t.status == TransactionStatus::Completed);
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total_amount = transactions.iter().map(|t| t.amount).sum();
        Self {
            total_count: transactions.len() as u64,
            total_amount,
            transactions,
        }
    }
}

/// Aggregate figures for one payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MethodStats {
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Number of completed donations.
    pub donation_count: u64,
    /// Sum of completed donations.
    #[schema(value_type = String)]
    pub total_amount: Amount,
    /// Mean completed donation, rounded down to the cent.
    #[schema(value_type = String)]
    pub average_amount: Amount,
}

impl MethodStats {
    /// Groups the completed transactions by payment method, ordered by
    /// method name.
    #[must_use]
    pub fn from_transactions(transactions: &[Transaction]) -> Vec<Self> {
        let mut grouped: Vec<(PaymentMethod, i64, Amount)> = Vec::new();
        for tx in transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Completed)
        {
            match grouped.iter_mut().find(|(m, ..)| *m == tx.payment_method) {
                Some((_, count, total)) => {
                    *count += 1;
                    *total = total.checked_add(tx.amount).unwrap_or(*total);
                }
                None => grouped.push((tx.payment_method, 1, tx.amount)),
            }
        }
        grouped.sort_by_key(|(m, ..)| m.as_str());
        grouped
            .into_iter()
            .map(|(payment_method, count, total)| Self {
                payment_method,
                donation_count: u64::try_from(count).unwrap_or(0),
                total_amount: total,
                average_amount: Amount::from_cents(total.cents() / count.max(1)),
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tx(cents: i64, at: DateTime<Utc>) -> Transaction {
        Transaction::new(
            SponsorshipId::new(),
            UserId::new(),
            Amount::from_cents(cents),
            PaymentMethod::Card,
            None,
            at,
        )
    }

    #[test]
    fn transition_table_is_enforced() {
        let now = Utc::now();
        let mut pending = Transaction {
            status: TransactionStatus::Pending,
            ..tx(100, now)
        };
        assert!(pending.transition(TransactionStatus::Completed, now).is_ok());
        assert!(pending.transition(TransactionStatus::Refunded, now).is_ok());
        assert!(matches!(
            pending.transition(TransactionStatus::Completed, now),
            Err(HealthPalError::InvalidTransition { .. })
        ));

        let mut failed = Transaction {
            status: TransactionStatus::Pending,
            ..tx(100, now)
        };
        assert!(failed.transition(TransactionStatus::Failed, now).is_ok());
        assert!(failed.transition(TransactionStatus::Refunded, now).is_err());
    }

    #[test]
    fn direct_methods_are_case_insensitive() {
        assert!(matches!(
            PaymentMethod::parse_direct("CARD"),
            Ok(PaymentMethod::Card)
        ));
        assert!(matches!(
            PaymentMethod::parse_direct(" bank "),
            Ok(PaymentMethod::Bank)
        ));
        assert!(matches!(
            PaymentMethod::parse_direct("gateway_card"),
            Err(HealthPalError::InvalidPaymentMethod(_))
        ));
        assert!(PaymentMethod::parse_direct("crypto").is_err());
    }

    #[test]
    fn method_stats_group_completed_rows() {
        let now = Utc::now();
        let bank = Transaction {
            payment_method: PaymentMethod::Bank,
            ..tx(900, now)
        };
        let failed = Transaction {
            status: TransactionStatus::Failed,
            ..tx(5_000, now)
        };
        let stats = MethodStats::from_transactions(&[tx(100, now), tx(200, now), bank, failed]);
        assert_eq!(stats.len(), 2);
        let Some(card) = stats.iter().find(|s| s.payment_method == PaymentMethod::Card) else {
            panic!("card group present");
        };
        assert_eq!(card.donation_count, 2);
        assert_eq!(card.total_amount, Amount::from_cents(300));
        assert_eq!(card.average_amount, Amount::from_cents(150));
    }

    #[test]
    fn history_totals_match_listed_rows() {
        let empty = DonationHistory::from_transactions(vec![]);
        assert_eq!(empty.total_count, 0);
        assert_eq!(empty.total_amount, Amount::ZERO);

        let t0 = Utc::now();
        let refunded = Transaction {
            status: TransactionStatus::Refunded,
            ..tx(700, t0)
        };
        let history = DonationHistory::from_transactions(vec![
            tx(1_000, t0),
            refunded,
            tx(250, t0 + Duration::seconds(5)),
        ]);
        assert_eq!(history.total_count, 2);
        assert_eq!(history.total_amount, Amount::from_cents(1_250));
        let listed: Amount = history.transactions.iter().map(|t| t.amount).sum();
        assert_eq!(listed, history.total_amount);
        assert!(
            history
                .transactions
                .first()
                .is_some_and(|t| t.amount == Amount::from_cents(250))
        );
    }
}
