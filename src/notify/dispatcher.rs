//! Background task delivering notifications for committed ledger events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::{Email, Notifier, NotifyError};
use crate::domain::{Amount, EventBus, LedgerEvent, UserId, UserProfile};
use crate::persistence::{LedgerStore, UserStore};

/// Resolves recipients and sends the messages for one event at a time.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    users: Arc<dyn UserStore>,
    ledger: Arc<dyn LedgerStore>,
    timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher bounding every delivery by `timeout`.
    #[must_use]
    pub fn new(
        notifier: Arc<dyn Notifier>,
        users: Arc<dyn UserStore>,
        ledger: Arc<dyn LedgerStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            notifier,
            users,
            ledger,
            timeout,
        }
    }

    /// Sends the messages for `event`. Failures are logged, never returned.
    pub async fn handle(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::DonationRecorded {
                sponsorship_id,
                donor_id,
                amount,
                new_total,
                ..
            } => {
                let treatment = match self.ledger.get_sponsorship(*sponsorship_id).await {
                    Ok(Some(s)) => Some((s.treatment_type, s.goal_amount, s.beneficiary_id)),
                    Ok(None) => None,
                    Err(e) => {
                        tracing::warn!(%sponsorship_id, error = %e, "sponsorship lookup failed");
                        None
                    }
                };
                let treatment_name = treatment
                    .as_ref()
                    .map_or_else(|| "a treatment".to_string(), |(t, ..)| t.clone());

                if let Some(donor) = self.contact(*donor_id).await {
                    let message = format!(
                        "HealthPal: Your donation of ${amount} towards {treatment_name} has been \
                         confirmed. Thank you for your generosity!"
                    );
                    self.email(&donor, "Donation confirmed", &message).await;
                    self.sms(&donor, &message).await;
                }

                let Some((treatment_type, goal, beneficiary_id)) = treatment else {
                    return;
                };
                if let Some(beneficiary) = self.contact(beneficiary_id).await {
                    let message = format!(
                        "HealthPal: Your {treatment_type} sponsorship is now {}% funded.",
                        percent_funded(*new_total, goal)
                    );
                    self.sms(&beneficiary, &message).await;
                }
            }
            LedgerEvent::SponsorshipFunded {
                sponsorship_id,
                beneficiary_id,
                goal_amount,
                donated_amount,
                ..
            } => {
                if let Some(beneficiary) = self.contact(*beneficiary_id).await {
                    let body = format!(
                        "Dear {}, your sponsorship {sponsorship_id} reached its goal of \
                         ${goal_amount} with ${donated_amount} raised.",
                        beneficiary.full_name
                    );
                    self.email(&beneficiary, "Your sponsorship is fully funded", &body)
                        .await;
                }
            }
            LedgerEvent::DonationRefunded {
                donor_id, amount, ..
            } => {
                if let Some(donor) = self.contact(*donor_id).await {
                    let body = format!("HealthPal: Your donation of ${amount} has been refunded.");
                    self.email(&donor, "Donation refunded", &body).await;
                }
            }
            LedgerEvent::ConsultationBooked {
                consultation_id,
                patient_id,
                doctor_id,
                scheduled_time,
                ..
            } => {
                let doctor_name = self
                    .contact(*doctor_id)
                    .await
                    .map_or_else(|| "your doctor".to_string(), |d| d.full_name);
                if let Some(patient) = self.contact(*patient_id).await {
                    let when = scheduled_time.format("%Y-%m-%d %H:%M UTC");
                    let message = format!(
                        "HealthPal: Your consultation with Dr. {doctor_name} is scheduled for \
                         {when} (ref {consultation_id})."
                    );
                    self.email(&patient, "Consultation booked", &message).await;
                    self.sms(&patient, &message).await;
                }
            }
        }
    }

    async fn contact(&self, id: UserId) -> Option<UserProfile> {
        match self.users.get_user(id).await {
            Ok(found) => {
                if found.is_none() {
                    tracing::debug!(user_id = %id, "no directory entry, skipping notification");
                }
                found
            }
            Err(e) => {
                tracing::warn!(user_id = %id, error = %e, "contact lookup failed");
                None
            }
        }
    }

    async fn email(&self, user: &UserProfile, subject: &str, body: &str) {
        let email = Email {
            to: user.email.clone(),
            subject: subject.to_string(),
            body: body.to_string(),
        };
        let result = tokio::time::timeout(self.timeout, self.notifier.send_email(&email))
            .await
            .unwrap_or(Err(NotifyError::Timeout(self.timeout)));
        if let Err(e) = result {
            tracing::warn!(user_id = %user.id, error = %e, "email notification failed");
        }
    }

    async fn sms(&self, user: &UserProfile, message: &str) {
        let Some(phone) = user.phone.as_deref() else {
            return;
        };
        let result = tokio::time::timeout(self.timeout, self.notifier.send_sms(phone, message))
            .await
            .unwrap_or(Err(NotifyError::Timeout(self.timeout)));
        if let Err(e) = result {
            tracing::warn!(user_id = %user.id, error = %e, "sms notification failed");
        }
    }
}

fn percent_funded(total: Amount, goal: Amount) -> i64 {
    if goal.is_positive() {
        total.cents().saturating_mul(100) / goal.cents()
    } else {
        0
    }
}

/// Subscribes to `bus` and handles events until the bus is dropped.
#[must_use]
pub fn spawn_dispatcher(bus: &EventBus, dispatcher: Dispatcher) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => dispatcher.handle(&event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification dispatcher lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::info!("notification dispatcher stopped");
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Role, SponsorshipId};
    use crate::persistence::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recording {
        emails: Mutex<Vec<Email>>,
        sms: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn send_email(&self, email: &Email) -> Result<(), NotifyError> {
            self.emails.lock().await.push(email.clone());
            Ok(())
        }

        async fn send_sms(&self, phone: &str, _message: &str) -> Result<(), NotifyError> {
            self.sms.lock().await.push(phone.to_string());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        async fn send_email(&self, _email: &Email) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp down".to_string()))
        }

        async fn send_sms(&self, _phone: &str, _message: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("sms down".to_string()))
        }
    }

    fn user(role: Role, phone: Option<&str>) -> UserProfile {
        UserProfile {
            id: UserId::new(),
            full_name: "Omar Saleh".to_string(),
            email: format!("{}@example.org", UserId::new()),
            phone: phone.map(str::to_string),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn percent_is_floored() {
        assert_eq!(percent_funded(Amount::from_cents(6_000), Amount::from_cents(10_000)), 60);
        assert_eq!(percent_funded(Amount::from_cents(11_000), Amount::from_cents(10_000)), 110);
        assert_eq!(percent_funded(Amount::from_cents(1), Amount::ZERO), 0);
    }

    #[tokio::test]
    async fn funded_event_emails_beneficiary() {
        let store = Arc::new(MemoryStore::new());
        let beneficiary = user(Role::Patient, Some("+970500000"));
        assert!(store.insert_user(&beneficiary).await.is_ok());
        let recording = Arc::new(Recording::default());
        let dispatcher = Dispatcher::new(
            Arc::clone(&recording) as Arc<dyn Notifier>,
            Arc::clone(&store) as Arc<dyn UserStore>,
            store,
            Duration::from_secs(1),
        );

        dispatcher
            .handle(&LedgerEvent::SponsorshipFunded {
                sponsorship_id: SponsorshipId::new(),
                beneficiary_id: beneficiary.id,
                goal_amount: Amount::from_cents(10_000),
                donated_amount: Amount::from_cents(11_000),
                timestamp: Utc::now(),
            })
            .await;

        let emails = recording.emails.lock().await;
        assert_eq!(emails.len(), 1);
        assert!(emails.iter().all(|e| e.to == beneficiary.email));
    }

    #[tokio::test]
    async fn delivery_failures_are_swallowed() {
        let store = Arc::new(MemoryStore::new());
        let donor = user(Role::Donor, Some("+970511111"));
        assert!(store.insert_user(&donor).await.is_ok());
        let dispatcher = Dispatcher::new(
            Arc::new(Failing),
            Arc::clone(&store) as Arc<dyn UserStore>,
            store,
            Duration::from_millis(50),
        );

        dispatcher
            .handle(&LedgerEvent::DonationRefunded {
                transaction_id: crate::domain::TransactionId::new(),
                sponsorship_id: SponsorshipId::new(),
                donor_id: donor.id,
                amount: Amount::from_cents(500),
                reopened: false,
                timestamp: Utc::now(),
            })
            .await;
    }
}
