//! Domain events emitted after a unit of work commits.
//!
//! Services publish a [`LedgerEvent`] through the [`super::EventBus`] once the
//! store has committed. The notification dispatcher consumes them; nothing on
//! the request path waits for a subscriber.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Amount, ConsultationId, PaymentMethod, SponsorshipId, TransactionId, UserId};

/// Domain event emitted after a committed state change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A completed donation was credited to a sponsorship.
    DonationRecorded {
        /// Transaction identifier.
        transaction_id: TransactionId,
        /// Credited sponsorship.
        sponsorship_id: SponsorshipId,
        /// Donor.
        donor_id: UserId,
        /// Donated amount.
        amount: Amount,
        /// Payment method.
        payment_method: PaymentMethod,
        /// Sponsorship total after the credit.
        new_total: Amount,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A sponsorship crossed its goal.
    SponsorshipFunded {
        /// Funded sponsorship.
        sponsorship_id: SponsorshipId,
        /// Owning patient.
        beneficiary_id: UserId,
        /// Campaign goal.
        goal_amount: Amount,
        /// Total at the crossing.
        donated_amount: Amount,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A completed donation was refunded.
    DonationRefunded {
        /// Refunded transaction.
        transaction_id: TransactionId,
        /// Debited sponsorship.
        sponsorship_id: SponsorshipId,
        /// Donor.
        donor_id: UserId,
        /// Refunded amount.
        amount: Amount,
        /// The campaign went from funded back to open.
        reopened: bool,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A patient booked a consultation.
    ConsultationBooked {
        /// New consultation.
        consultation_id: ConsultationId,
        /// Booking patient.
        patient_id: UserId,
        /// Requested doctor.
        doctor_id: UserId,
        /// Scheduled start.
        scheduled_time: DateTime<Utc>,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::DonationRecorded { .. } => "donation_recorded",
            Self::SponsorshipFunded { .. } => "sponsorship_funded",
            Self::DonationRefunded { .. } => "donation_refunded",
            Self::ConsultationBooked { .. } => "consultation_booked",
        }
    }

    /// Returns the sponsorship this event concerns, if any.
    #[must_use]
    pub const fn sponsorship_id(&self) -> Option<SponsorshipId> {
        match self {
            Self::DonationRecorded { sponsorship_id, .. }
            | Self::SponsorshipFunded { sponsorship_id, .. }
            | Self::DonationRefunded { sponsorship_id, .. } => Some(*sponsorship_id),
            Self::ConsultationBooked { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funded_event_serializes_with_tag() {
        let event = LedgerEvent::SponsorshipFunded {
            sponsorship_id: SponsorshipId::new(),
            beneficiary_id: UserId::new(),
            goal_amount: Amount::from_cents(10_000),
            donated_amount: Amount::from_cents(11_000),
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type_str(), "sponsorship_funded");
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"sponsorship_funded\""));
        assert!(json.contains("\"110.00\""));
    }

    #[test]
    fn sponsorship_accessor() {
        let id = SponsorshipId::new();
        let event = LedgerEvent::DonationRefunded {
            transaction_id: TransactionId::new(),
            sponsorship_id: id,
            donor_id: UserId::new(),
            amount: Amount::from_cents(500),
            reopened: true,
            timestamp: Utc::now(),
        };
        assert_eq!(event.sponsorship_id(), Some(id));
    }
}
