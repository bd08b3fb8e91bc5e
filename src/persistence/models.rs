//! Database row models and their conversion into domain types.
//!
//! Status and method columns are `TEXT`; money columns are `BIGINT` cents.
//! Rows that fail to convert indicate a corrupt table and surface as
//! [`HealthPalError::Persistence`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Amount, Call, Consultation, MethodStats, Sponsorship, Transaction, UserProfile,
};
use crate::error::HealthPalError;

fn corrupt(column: &'static str) -> impl FnOnce(HealthPalError) -> HealthPalError {
    move |e| HealthPalError::Persistence(format!("corrupt {column} column: {e}"))
}

/// A row of the `sponsorships` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SponsorshipRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning patient.
    pub beneficiary_id: Uuid,
    /// Treatment being funded.
    pub treatment_type: String,
    /// Goal in cents.
    pub goal_amount_cents: i64,
    /// Raised total in cents.
    pub donated_amount_cents: i64,
    /// `open`, `funded` or `closed`.
    pub status: String,
    /// Free-text description.
    pub description: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SponsorshipRow> for Sponsorship {
    type Error = HealthPalError;

    fn try_from(row: SponsorshipRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            beneficiary_id: row.beneficiary_id.into(),
            treatment_type: row.treatment_type,
            goal_amount: Amount::from_cents(row.goal_amount_cents),
            donated_amount: Amount::from_cents(row.donated_amount_cents),
            status: row.status.parse().map_err(corrupt("sponsorships.status"))?,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

/// A row of the `transactions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    /// Primary key.
    pub id: Uuid,
    /// Credited sponsorship.
    pub sponsorship_id: Uuid,
    /// Donor.
    pub donor_id: Uuid,
    /// Amount in cents.
    pub amount_cents: i64,
    /// `card`, `bank` or `gateway_card`.
    pub payment_method: String,
    /// `pending`, `completed`, `failed` or `refunded`.
    pub status: String,
    /// Gateway reference (unique).
    pub external_payment_ref: Option<String>,
    /// Gateway receipt link.
    pub receipt_url: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = HealthPalError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            sponsorship_id: row.sponsorship_id.into(),
            donor_id: row.donor_id.into(),
            amount: Amount::from_cents(row.amount_cents),
            payment_method: row
                .payment_method
                .parse()
                .map_err(corrupt("transactions.payment_method"))?,
            status: row.status.parse().map_err(corrupt("transactions.status"))?,
            external_payment_ref: row.external_payment_ref,
            receipt_url: row.receipt_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// One `GROUP BY payment_method` row over completed transactions.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MethodStatsRow {
    /// Payment method.
    pub payment_method: String,
    /// Number of completed donations.
    pub donation_count: i64,
    /// Summed cents.
    pub total_cents: i64,
}

impl TryFrom<MethodStatsRow> for MethodStats {
    type Error = HealthPalError;

    fn try_from(row: MethodStatsRow) -> Result<Self, Self::Error> {
        let average = if row.donation_count > 0 {
            row.total_cents / row.donation_count
        } else {
            0
        };
        Ok(Self {
            payment_method: row
                .payment_method
                .parse()
                .map_err(corrupt("transactions.payment_method"))?,
            donation_count: u64::try_from(row.donation_count).unwrap_or(0),
            total_amount: Amount::from_cents(row.total_cents),
            average_amount: Amount::from_cents(average),
        })
    }
}

/// A row of the `consultations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConsultationRow {
    /// Primary key.
    pub id: Uuid,
    /// Booking patient.
    pub patient_id: Uuid,
    /// Assigned doctor.
    pub doctor_id: Uuid,
    /// Scheduled start.
    pub scheduled_time: DateTime<Utc>,
    /// `chat`, `audio` or `video`.
    pub mode: String,
    /// Lifecycle status.
    pub status: String,
    /// Patient notes.
    pub notes: String,
    /// Booking timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ConsultationRow> for Consultation {
    type Error = HealthPalError;

    fn try_from(row: ConsultationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            patient_id: row.patient_id.into(),
            doctor_id: row.doctor_id.into(),
            scheduled_time: row.scheduled_time,
            mode: row.mode.parse().map_err(corrupt("consultations.mode"))?,
            status: row.status.parse().map_err(corrupt("consultations.status"))?,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

/// A row of the `calls` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CallRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning consultation.
    pub consultation_id: Uuid,
    /// Participant who started the call.
    pub initiator_id: Uuid,
    /// `audio` or `video`.
    pub modality: String,
    /// `active` or `completed`.
    pub status: String,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// End timestamp.
    pub ended_at: Option<DateTime<Utc>>,
    /// Length in seconds.
    pub duration_seconds: Option<i64>,
}

impl TryFrom<CallRow> for Call {
    type Error = HealthPalError;

    fn try_from(row: CallRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            consultation_id: row.consultation_id.into(),
            initiator_id: row.initiator_id.into(),
            modality: row.modality.parse().map_err(corrupt("calls.modality"))?,
            status: row.status.parse().map_err(corrupt("calls.status"))?,
            started_at: row.started_at,
            ended_at: row.ended_at,
            duration_seconds: row.duration_seconds,
        })
    }
}

/// A row of the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    /// Primary key.
    pub id: Uuid,
    /// Display name.
    pub full_name: String,
    /// Contact email (unique).
    pub email: String,
    /// Phone number.
    pub phone: Option<String>,
    /// Role.
    pub role: String,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserProfile {
    type Error = HealthPalError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            full_name: row.full_name,
            email: row.email,
            phone: row.phone,
            role: row.role.parse().map_err(corrupt("users.role"))?,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SponsorshipStatus, TransactionStatus};

    #[test]
    fn sponsorship_row_converts() {
        let row = SponsorshipRow {
            id: Uuid::new_v4(),
            beneficiary_id: Uuid::new_v4(),
            treatment_type: "chemotherapy".to_string(),
            goal_amount_cents: 500_000,
            donated_amount_cents: 125_050,
            status: "open".to_string(),
            description: "six cycles".to_string(),
            created_at: Utc::now(),
        };
        let sponsorship = Sponsorship::try_from(row);
        assert!(sponsorship.is_ok_and(|s| {
            s.status == SponsorshipStatus::Open && s.donated_amount.to_string() == "1250.50"
        }));
    }

    #[test]
    fn unknown_status_is_a_persistence_error() {
        let row = TransactionRow {
            id: Uuid::new_v4(),
            sponsorship_id: Uuid::new_v4(),
            donor_id: Uuid::new_v4(),
            amount_cents: 100,
            payment_method: "card".to_string(),
            status: "lost".to_string(),
            external_payment_ref: None,
            receipt_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            Transaction::try_from(row.clone()),
            Err(HealthPalError::Persistence(_))
        ));
        let ok = TransactionRow {
            status: "refunded".to_string(),
            ..row
        };
        assert!(Transaction::try_from(ok).is_ok_and(|t| t.status == TransactionStatus::Refunded));
    }

    #[test]
    fn method_stats_average_rounds_down() {
        let row = MethodStatsRow {
            payment_method: "bank".to_string(),
            donation_count: 3,
            total_cents: 1_000,
        };
        assert!(MethodStats::try_from(row).is_ok_and(|m| m.average_amount.cents() == 333));
    }
}
