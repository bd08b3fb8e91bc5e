//! Consultation aggregate and its status transition table.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{CallModality, ConsultationId, UserId};
use crate::error::HealthPalError;

/// Interaction mode chosen at booking time; immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationMode {
    /// Text chat.
    Chat,
    /// Audio call.
    Audio,
    /// Video call.
    Video,
}

impl ConsultationMode {
    /// Returns the storage / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Returns `true` if calls of `modality` may run in this mode.
    #[must_use]
    pub const fn supports(self, modality: CallModality) -> bool {
        matches!(
            (self, modality),
            (Self::Audio, CallModality::Audio) | (Self::Video, CallModality::Video)
        )
    }
}

impl fmt::Display for ConsultationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsultationMode {
    type Err = HealthPalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(HealthPalError::InvalidRequest(format!(
                "invalid mode {other:?}, must be one of: chat, audio, video"
            ))),
        }
    }
}

/// Consultation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    /// Booked, awaiting the doctor.
    Pending,
    /// Accepted by the doctor.
    Accepted,
    /// A call is running or has run.
    #[serde(alias = "in-progress")]
    InProgress,
    /// Finished; terminal.
    Completed,
    /// Cancelled or declined; terminal.
    Cancelled,
}

impl ConsultationStatus {
    /// Every permitted `(from, to)` status change.
    pub const TRANSITIONS: &'static [(Self, Self)] = &[
        (Self::Pending, Self::Accepted),
        (Self::Accepted, Self::InProgress),
        (Self::InProgress, Self::Completed),
        (Self::Pending, Self::Cancelled),
        (Self::Accepted, Self::Cancelled),
    ];

    /// Returns `true` if `self -> next` is in the transition table.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        Self::TRANSITIONS.contains(&(self, next))
    }

    /// Returns `true` while calls may be started.
    #[must_use]
    pub const fn allows_calls(self) -> bool {
        matches!(self, Self::Accepted | Self::InProgress)
    }

    /// Returns the storage / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsultationStatus {
    type Err = HealthPalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(HealthPalError::InvalidRequest(format!(
                "unknown consultation status: {other}"
            ))),
        }
    }
}

/// Which side of a consultation a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    /// The booking patient.
    Patient,
    /// The assigned doctor.
    Doctor,
}

/// Validated booking input.
#[derive(Debug, Clone)]
pub struct NewConsultation {
    /// Booking patient.
    pub patient_id: UserId,
    /// Requested doctor.
    pub doctor_id: UserId,
    /// Scheduled start.
    pub scheduled_time: DateTime<Utc>,
    /// Interaction mode.
    pub mode: ConsultationMode,
    /// Optional notes from the patient.
    pub notes: Option<String>,
}

/// A scheduled patient/doctor interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Consultation {
    /// Consultation identifier.
    #[schema(value_type = uuid::Uuid)]
    pub id: ConsultationId,
    /// Booking patient.
    #[schema(value_type = uuid::Uuid)]
    pub patient_id: UserId,
    /// Assigned doctor.
    #[schema(value_type = uuid::Uuid)]
    pub doctor_id: UserId,
    /// Scheduled start.
    pub scheduled_time: DateTime<Utc>,
    /// Interaction mode (immutable).
    pub mode: ConsultationMode,
    /// Lifecycle status.
    pub status: ConsultationStatus,
    /// Patient notes.
    pub notes: String,
    /// Booking timestamp.
    pub created_at: DateTime<Utc>,
}

impl Consultation {
    /// Builds a `pending` consultation.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidRequest`] when a patient tries to
    /// book themselves.
    pub fn book(new: NewConsultation, now: DateTime<Utc>) -> Result<Self, HealthPalError> {
        if new.patient_id == new.doctor_id {
            return Err(HealthPalError::InvalidRequest(
                "patient and doctor must be different users".to_string(),
            ));
        }
        Ok(Self {
            id: ConsultationId::new(),
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            scheduled_time: new.scheduled_time,
            mode: new.mode,
            status: ConsultationStatus::Pending,
            notes: new.notes.unwrap_or_default(),
            created_at: now,
        })
    }

    /// Returns the caller's side, if they take part in the consultation.
    #[must_use]
    pub fn participant(&self, user: UserId) -> Option<Participant> {
        if user == self.patient_id {
            Some(Participant::Patient)
        } else if user == self.doctor_id {
            Some(Participant::Doctor)
        } else {
            None
        }
    }

    /// Returns the caller's side or a `Forbidden` error.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Forbidden`] for non-participants.
    pub fn require_participant(&self, user: UserId) -> Result<Participant, HealthPalError> {
        self.participant(user).ok_or_else(|| {
            HealthPalError::Forbidden(format!(
                "user {user} is not a participant of consultation {}",
                self.id
            ))
        })
    }

    /// Applies a status change requested by `actor`.
    ///
    /// Accepting is reserved for the assigned doctor; any other change in the
    /// table may be requested by either participant.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Forbidden`] for non-participants or a
    /// patient accepting, and [`HealthPalError::InvalidTransition`] for
    /// changes outside the table.
    pub fn change_status(
        &mut self,
        actor: UserId,
        next: ConsultationStatus,
    ) -> Result<(), HealthPalError> {
        let side = self.require_participant(actor)?;
        if next == ConsultationStatus::Accepted && side != Participant::Doctor {
            return Err(HealthPalError::Forbidden(
                "only the assigned doctor can accept a consultation".to_string(),
            ));
        }
        self.transition(next)
    }

    /// Moves the consultation to `next` without an actor check.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidTransition`] for changes outside the
    /// table.
    pub fn transition(&mut self, next: ConsultationStatus) -> Result<(), HealthPalError> {
        if !self.status.can_transition_to(next) {
            return Err(HealthPalError::InvalidTransition {
                entity: "consultation",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Checks that `initiator` may start a `modality` call right now.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Forbidden`] for non-participants,
    /// [`HealthPalError::ModeMismatch`] when the modality differs from the
    /// booked mode, and [`HealthPalError::InvalidTransition`] unless the
    /// consultation is accepted or in progress.
    pub fn check_call_start(
        &self,
        initiator: UserId,
        modality: CallModality,
    ) -> Result<(), HealthPalError> {
        self.require_participant(initiator)?;
        if !self.mode.supports(modality) {
            return Err(HealthPalError::ModeMismatch {
                mode: self.mode.to_string(),
                modality: modality.to_string(),
            });
        }
        if !self.status.allows_calls() {
            return Err(HealthPalError::InvalidTransition {
                entity: "consultation",
                from: self.status.to_string(),
                to: ConsultationStatus::InProgress.to_string(),
            });
        }
        Ok(())
    }

    /// Marks the consultation as running, if it is not already.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidTransition`] from states other than
    /// accepted or in progress.
    pub fn mark_in_progress(&mut self) -> Result<bool, HealthPalError> {
        if self.status == ConsultationStatus::InProgress {
            return Ok(false);
        }
        self.transition(ConsultationStatus::InProgress)?;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn booked(mode: ConsultationMode) -> Consultation {
        let Ok(c) = Consultation::book(
            NewConsultation {
                patient_id: UserId::new(),
                doctor_id: UserId::new(),
                scheduled_time: Utc::now(),
                mode,
                notes: None,
            },
            Utc::now(),
        ) else {
            panic!("valid booking");
        };
        c
    }

    #[test]
    fn booking_starts_pending() {
        let c = booked(ConsultationMode::Chat);
        assert_eq!(c.status, ConsultationStatus::Pending);
        assert!(c.notes.is_empty());
    }

    #[test]
    fn only_doctor_accepts() {
        let mut c = booked(ConsultationMode::Video);
        let patient = c.patient_id;
        let doctor = c.doctor_id;
        assert!(matches!(
            c.change_status(patient, ConsultationStatus::Accepted),
            Err(HealthPalError::Forbidden(_))
        ));
        assert!(matches!(
            c.change_status(UserId::new(), ConsultationStatus::Cancelled),
            Err(HealthPalError::Forbidden(_))
        ));
        assert!(c.change_status(doctor, ConsultationStatus::Accepted).is_ok());
        assert!(matches!(
            c.change_status(doctor, ConsultationStatus::Accepted),
            Err(HealthPalError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn transition_table_rejects_skips() {
        let mut c = booked(ConsultationMode::Audio);
        assert!(c.transition(ConsultationStatus::Completed).is_err());
        assert!(c.transition(ConsultationStatus::InProgress).is_err());
        assert!(c.transition(ConsultationStatus::Cancelled).is_ok());
        assert!(c.transition(ConsultationStatus::Accepted).is_err());
    }

    #[test]
    fn call_start_checks_mode_and_status() {
        let mut c = booked(ConsultationMode::Video);
        let patient = c.patient_id;
        assert!(matches!(
            c.check_call_start(patient, CallModality::Video),
            Err(HealthPalError::InvalidTransition { .. })
        ));
        let _ = c.transition(ConsultationStatus::Accepted);
        assert!(matches!(
            c.check_call_start(patient, CallModality::Audio),
            Err(HealthPalError::ModeMismatch { .. })
        ));
        assert!(c.check_call_start(patient, CallModality::Video).is_ok());
        assert!(matches!(
            c.check_call_start(UserId::new(), CallModality::Video),
            Err(HealthPalError::Forbidden(_))
        ));
    }

    #[test]
    fn legacy_hyphenated_status_is_accepted() {
        let Ok(status) = serde_json::from_str::<ConsultationStatus>("\"in-progress\"") else {
            panic!("alias should deserialize");
        };
        assert_eq!(status, ConsultationStatus::InProgress);
        assert!(matches!(
            "in-progress".parse::<ConsultationStatus>(),
            Ok(ConsultationStatus::InProgress)
        ));
    }
}
