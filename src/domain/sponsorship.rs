//! Sponsorship aggregate: funding campaign state and its funding rules.
//!
//! All changes to `donated_amount` go through [`Sponsorship::accept_donation`],
//! [`Sponsorship::credit`] or [`Sponsorship::debit`], which keep the status
//! in step with the total (`funded` iff `donated_amount >= goal_amount`).
//! Stores call these inside their atomic unit of work.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Amount, SponsorshipId, Transaction, TransactionStatus, UserId};
use crate::error::HealthPalError;

/// Funding campaign status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SponsorshipStatus {
    /// Accepting donations.
    Open,
    /// Donated amount reached the goal.
    Funded,
    /// Closed manually; terminal.
    Closed,
}

impl SponsorshipStatus {
    /// Every permitted `(from, to)` status change.
    pub const TRANSITIONS: &'static [(Self, Self)] = &[
        (Self::Open, Self::Funded),
        (Self::Funded, Self::Open),
        (Self::Open, Self::Closed),
        (Self::Funded, Self::Closed),
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
            Self::Open => "open",
            Self::Funded => "funded",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SponsorshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SponsorshipStatus {
    type Err = HealthPalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "funded" => Ok(Self::Funded),
            "closed" => Ok(Self::Closed),
            other => Err(HealthPalError::InvalidRequest(format!(
                "unknown sponsorship status: {other}"
            ))),
        }
    }
}

/// Validated input for a new campaign.
#[derive(Debug, Clone)]
pub struct NewSponsorship {
    /// Patient the campaign raises money for.
    pub beneficiary_id: UserId,
    /// Treatment being funded.
    pub treatment_type: String,
    /// Target amount (strictly positive).
    pub goal_amount: Amount,
    /// Free-text description.
    pub description: String,
}

/// Result of a change to a campaign's donated amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingChange {
    /// Total before the change.
    pub previous_total: Amount,
    /// Total after the change.
    pub new_total: Amount,
    /// The change moved the campaign from `open` to `funded`.
    pub became_funded: bool,
    /// The change moved the campaign from `funded` back to `open`.
    pub reopened: bool,
}

/// A funding campaign for one patient's treatment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Sponsorship {
    /// Campaign identifier.
    #[schema(value_type = uuid::Uuid)]
    pub id: SponsorshipId,
    /// Owning patient.
    #[schema(value_type = uuid::Uuid)]
    pub beneficiary_id: UserId,
    /// Treatment being funded.
    pub treatment_type: String,
    /// Target amount.
    #[schema(value_type = String, example = "100.00")]
    pub goal_amount: Amount,
    /// Sum of completed donations.
    #[schema(value_type = String, example = "60.00")]
    pub donated_amount: Amount,
    /// Campaign status.
    pub status: SponsorshipStatus,
    /// Free-text description.
    pub description: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Sponsorship {
    /// Validates the input and builds an `open` campaign with nothing raised.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidAmount`] for a non-positive goal and
    /// [`HealthPalError::InvalidRequest`] for an empty treatment type or
    /// description.
    pub fn open(new: NewSponsorship, now: DateTime<Utc>) -> Result<Self, HealthPalError> {
        if !new.goal_amount.is_positive() {
            return Err(HealthPalError::InvalidAmount(
                "goal_amount must be positive".to_string(),
            ));
        }
        let treatment_type = new.treatment_type.trim().to_string();
        let description = new.description.trim().to_string();
        if treatment_type.is_empty() {
            return Err(HealthPalError::InvalidRequest(
                "treatment_type is required".to_string(),
            ));
        }
        if description.is_empty() {
            return Err(HealthPalError::InvalidRequest(
                "description is required".to_string(),
            ));
        }

        Ok(Self {
            id: SponsorshipId::new(),
            beneficiary_id: new.beneficiary_id,
            treatment_type,
            goal_amount: new.goal_amount,
            donated_amount: Amount::ZERO,
            status: SponsorshipStatus::Open,
            description,
            created_at: now,
        })
    }

    /// Returns `true` once the donated amount reached the goal.
    #[must_use]
    pub fn is_fully_funded(&self) -> bool {
        self.donated_amount >= self.goal_amount
    }

    /// Amount still needed to reach the goal (zero when funded).
    #[must_use]
    pub fn remaining(&self) -> Amount {
        self.goal_amount
            .checked_sub(self.donated_amount)
            .filter(|a| a.is_positive())
            .unwrap_or(Amount::ZERO)
    }

    /// Checks that a new donation would be accepted, without changing state.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::SponsorshipClosed`] for closed campaigns and
    /// [`HealthPalError::AlreadyFunded`] once the goal was reached.
    pub fn ensure_accepting(&self) -> Result<(), HealthPalError> {
        if self.status == SponsorshipStatus::Closed {
            return Err(HealthPalError::SponsorshipClosed(self.id));
        }
        if self.is_fully_funded() {
            return Err(HealthPalError::AlreadyFunded(self.id));
        }
        Ok(())
    }

    /// Applies a new donation under the "no donations once funded" rule.
    ///
    /// The crossing donation itself may overshoot the goal.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidAmount`] for non-positive amounts and
    /// the errors of [`Sponsorship::ensure_accepting`].
    pub fn accept_donation(&mut self, amount: Amount) -> Result<FundingChange, HealthPalError> {
        if !amount.is_positive() {
            return Err(HealthPalError::InvalidAmount(
                "amount must be positive".to_string(),
            ));
        }
        self.ensure_accepting()?;
        self.credit(amount)
    }

    /// Credits funds that were already captured (e.g. a settled gateway
    /// payment). Bypasses the acceptance rule but still drives `funded`.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidAmount`] for non-positive amounts or
    /// on overflow.
    pub fn credit(&mut self, amount: Amount) -> Result<FundingChange, HealthPalError> {
        if !amount.is_positive() {
            return Err(HealthPalError::InvalidAmount(
                "amount must be positive".to_string(),
            ));
        }
        let previous_total = self.donated_amount;
        let new_total = previous_total
            .checked_add(amount)
            .ok_or_else(|| HealthPalError::InvalidAmount("donated total overflow".to_string()))?;
        self.donated_amount = new_total;

        let became_funded = self.status == SponsorshipStatus::Open && self.is_fully_funded();
        if became_funded {
            self.transition(SponsorshipStatus::Funded)?;
        }

        Ok(FundingChange {
            previous_total,
            new_total,
            became_funded,
            reopened: false,
        })
    }

    /// Debits a refunded donation. A funded campaign that falls back below
    /// its goal returns to `open`.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Internal`] if the debit would make the total
    /// negative, which means the ledger already drifted.
    pub fn debit(&mut self, amount: Amount) -> Result<FundingChange, HealthPalError> {
        let previous_total = self.donated_amount;
        let new_total = previous_total
            .checked_sub(amount)
            .filter(|t| t.cents() >= 0)
            .ok_or_else(|| {
                HealthPalError::Internal(format!(
                    "refund of {amount} exceeds donated total {previous_total} on sponsorship {}",
                    self.id
                ))
            })?;
        self.donated_amount = new_total;

        let reopened = self.status == SponsorshipStatus::Funded && !self.is_fully_funded();
        if reopened {
            self.transition(SponsorshipStatus::Open)?;
        }

        Ok(FundingChange {
            previous_total,
            new_total,
            became_funded: false,
            reopened,
        })
    }

    /// Closes the campaign.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidTransition`] if it is already closed.
    pub fn close(&mut self) -> Result<(), HealthPalError> {
        self.transition(SponsorshipStatus::Closed)
    }

    fn transition(&mut self, next: SponsorshipStatus) -> Result<(), HealthPalError> {
        if !self.status.can_transition_to(next) {
            return Err(HealthPalError::InvalidTransition {
                entity: "sponsorship",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Fundraising statistics over a campaign's completed donations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FundingStats {
    /// Number of distinct donors.
    pub donor_count: u64,
    /// Sum of completed donations.
    #[schema(value_type = String)]
    pub total_raised: Amount,
    /// Mean donation, rounded down to the cent.
    #[schema(value_type = Option<String>)]
    pub average_donation: Option<Amount>,
    /// Largest donation.
    #[schema(value_type = Option<String>)]
    pub max_donation: Option<Amount>,
    /// Smallest donation.
    #[schema(value_type = Option<String>)]
    pub min_donation: Option<Amount>,
}

impl FundingStats {
    /// Computes stats over the completed transactions in `transactions`;
    /// other statuses are ignored.
    #[must_use]
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let completed: Vec<&Transaction> = transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Completed)
            .collect();

        let donors: HashSet<UserId> = completed.iter().map(|t| t.donor_id).collect();
        let total_raised: Amount = completed.iter().map(|t| t.amount).sum();
        let count = i64::try_from(completed.len()).unwrap_or(i64::MAX);
        let average_donation =
            (count > 0).then(|| Amount::from_cents(total_raised.cents() / count));

        Self {
            donor_count: donors.len() as u64,
            total_raised,
            average_donation,
            max_donation: completed.iter().map(|t| t.amount).max(),
            min_donation: completed.iter().map(|t| t.amount).min(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::PaymentMethod;

    fn campaign(goal_cents: i64) -> Sponsorship {
        let Ok(s) = Sponsorship::open(
            NewSponsorship {
                beneficiary_id: UserId::new(),
                treatment_type: "dialysis".to_string(),
                goal_amount: Amount::from_cents(goal_cents),
                description: "three months of sessions".to_string(),
            },
            Utc::now(),
        ) else {
            panic!("valid campaign");
        };
        s
    }

    #[test]
    fn open_rejects_bad_input() {
        let base = NewSponsorship {
            beneficiary_id: UserId::new(),
            treatment_type: "surgery".to_string(),
            goal_amount: Amount::from_cents(100),
            description: "knee".to_string(),
        };
        let zero_goal = NewSponsorship {
            goal_amount: Amount::ZERO,
            ..base.clone()
        };
        assert!(matches!(
            Sponsorship::open(zero_goal, Utc::now()),
            Err(HealthPalError::InvalidAmount(_))
        ));
        let blank = NewSponsorship {
            description: "   ".to_string(),
            ..base
        };
        assert!(matches!(
            Sponsorship::open(blank, Utc::now()),
            Err(HealthPalError::InvalidRequest(_))
        ));
    }

    #[test]
    fn crossing_donation_funds_and_allows_overshoot() {
        let mut s = campaign(10_000);

        let Ok(first) = s.accept_donation(Amount::from_cents(6_000)) else {
            panic!("first donation accepted");
        };
        assert!(!first.became_funded);
        assert_eq!(s.status, SponsorshipStatus::Open);

        let Ok(second) = s.accept_donation(Amount::from_cents(5_000)) else {
            panic!("second donation accepted");
        };
        assert!(second.became_funded);
        assert_eq!(second.new_total, Amount::from_cents(11_000));
        assert_eq!(s.goal_amount, Amount::from_cents(10_000));
        assert_eq!(s.status, SponsorshipStatus::Funded);
    }

    #[test]
    fn funded_campaign_rejects_donations_without_change() {
        let mut s = campaign(1_000);
        let _ = s.accept_donation(Amount::from_cents(1_000));
        let before = s.clone();

        let result = s.accept_donation(Amount::from_cents(1));
        assert!(matches!(result, Err(HealthPalError::AlreadyFunded(_))));
        assert_eq!(s, before);
    }

    #[test]
    fn closed_campaign_rejects_donations() {
        let mut s = campaign(1_000);
        assert!(s.close().is_ok());
        assert!(matches!(
            s.accept_donation(Amount::from_cents(10)),
            Err(HealthPalError::SponsorshipClosed(_))
        ));
        assert!(matches!(
            s.close(),
            Err(HealthPalError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn credit_bypasses_acceptance_but_not_funding() {
        let mut s = campaign(1_000);
        let _ = s.accept_donation(Amount::from_cents(1_000));
        let Ok(change) = s.credit(Amount::from_cents(500)) else {
            panic!("settled funds are always credited");
        };
        assert!(!change.became_funded);
        assert_eq!(s.donated_amount, Amount::from_cents(1_500));
    }

    #[test]
    fn debit_below_goal_reopens() {
        let mut s = campaign(1_000);
        let _ = s.accept_donation(Amount::from_cents(1_200));
        let Ok(change) = s.debit(Amount::from_cents(300)) else {
            panic!("debit within total");
        };
        assert!(change.reopened);
        assert_eq!(s.status, SponsorshipStatus::Open);
        assert!(s.debit(Amount::from_cents(5_000)).is_err());
    }

    #[test]
    fn stats_only_count_completed() {
        let sponsorship_id = SponsorshipId::new();
        let donor = UserId::new();
        let now = Utc::now();
        let mk = |donor_id, cents, status| Transaction {
            status,
            ..Transaction::new(
                sponsorship_id,
                donor_id,
                Amount::from_cents(cents),
                PaymentMethod::Card,
                None,
                now,
            )
        };
        let rows = vec![
            mk(donor, 1_000, TransactionStatus::Completed),
            mk(donor, 3_000, TransactionStatus::Completed),
            mk(UserId::new(), 2_000, TransactionStatus::Completed),
            mk(UserId::new(), 9_999, TransactionStatus::Refunded),
        ];

        let stats = FundingStats::from_transactions(&rows);
        assert_eq!(stats.donor_count, 2);
        assert_eq!(stats.total_raised, Amount::from_cents(6_000));
        assert_eq!(stats.average_donation, Some(Amount::from_cents(2_000)));
        assert_eq!(stats.max_donation, Some(Amount::from_cents(3_000)));
        assert_eq!(stats.min_donation, Some(Amount::from_cents(1_000)));

        let empty = FundingStats::from_transactions(&[]);
        assert_eq!(empty.donor_count, 0);
        assert_eq!(empty.average_donation, None);
    }
}
