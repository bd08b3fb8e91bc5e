//! Consultation service: bookings, status changes and call sessions.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    Actor, Call, CallId, CallModality, CallStats, Consultation, ConsultationId, ConsultationMode,
    ConsultationStatus, EventBus, LedgerEvent, NewConsultation, Role, UserId,
};
use crate::error::HealthPalError;
use crate::persistence::{ConsultationStore, EndedCall, StartedCall, UserStore};

/// Booking request from a patient.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    /// Requested doctor.
    pub doctor_id: UserId,
    /// Scheduled start.
    pub scheduled_time: DateTime<Utc>,
    /// Interaction mode.
    pub mode: ConsultationMode,
    /// Optional notes.
    pub notes: Option<String>,
}

/// Orchestration layer for consultations and their calls.
#[derive(Debug, Clone)]
pub struct ConsultationService {
    store: Arc<dyn ConsultationStore>,
    users: Arc<dyn UserStore>,
    event_bus: EventBus,
}

impl ConsultationService {
    /// Creates a new `ConsultationService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        users: Arc<dyn UserStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            users,
            event_bus,
        }
    }

    /// Books a `pending` consultation with a registered doctor.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidRequest`] when the doctor is unknown
    /// or not a doctor, or when the patient books themselves.
    pub async fn book(
        &self,
        patient_id: UserId,
        request: BookingRequest,
    ) -> Result<Consultation, HealthPalError> {
        let doctor = self.users.get_user(request.doctor_id).await?;
        if !doctor.is_some_and(|d| d.role == Role::Doctor) {
            return Err(HealthPalError::InvalidRequest(format!(
                "doctor {} not found",
                request.doctor_id
            )));
        }

        let consultation = Consultation::book(
            NewConsultation {
                patient_id,
                doctor_id: request.doctor_id,
                scheduled_time: request.scheduled_time,
                mode: request.mode,
                notes: request.notes,
            },
            Utc::now(),
        )?;
        self.store.insert_consultation(&consultation).await?;

        tracing::info!(
            consultation_id = %consultation.id,
            %patient_id,
            doctor_id = %consultation.doctor_id,
            mode = %consultation.mode,
            "consultation booked"
        );
        let _ = self.event_bus.publish(LedgerEvent::ConsultationBooked {
            consultation_id: consultation.id,
            patient_id,
            doctor_id: consultation.doctor_id,
            scheduled_time: consultation.scheduled_time,
            timestamp: consultation.created_at,
        });
        Ok(consultation)
    }

    /// Moves a consultation to `next` on behalf of a participant.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::NotFound`], [`HealthPalError::Forbidden`] or
    /// [`HealthPalError::InvalidTransition`].
    pub async fn update_status(
        &self,
        id: ConsultationId,
        actor: UserId,
        next: ConsultationStatus,
    ) -> Result<Consultation, HealthPalError> {
        let updated = self
            .store
            .update_consultation_status(id, actor, next, Utc::now())
            .await?;
        tracing::info!(consultation_id = %id, %actor, status = %updated.status, "consultation status changed");
        Ok(updated)
    }

    /// Lists the caller's consultations: booked ones for patients, assigned
    /// ones for doctors.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Forbidden`] for other roles.
    pub async fn list_for(&self, actor: &Actor) -> Result<Vec<Consultation>, HealthPalError> {
        actor.require_role(&[Role::Patient, Role::Doctor])?;
        let all = self.store.list_consultations_for(actor.id).await?;
        Ok(all
            .into_iter()
            .filter(|c| match actor.role {
                Role::Doctor => c.doctor_id == actor.id,
                _ => c.patient_id == actor.id,
            })
            .collect())
    }

    /// Starts a call, completing any call of the same modality still active.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::NotFound`], [`HealthPalError::Forbidden`],
    /// [`HealthPalError::ModeMismatch`] or
    /// [`HealthPalError::InvalidTransition`].
    pub async fn start_call(
        &self,
        id: ConsultationId,
        initiator: UserId,
        modality: CallModality,
    ) -> Result<StartedCall, HealthPalError> {
        let started = self
            .store
            .start_call(id, initiator, modality, Utc::now())
            .await?;
        tracing::info!(
            consultation_id = %id,
            call_id = %started.call.id,
            %initiator,
            %modality,
            force_ended = started.force_ended.len(),
            "call started"
        );
        Ok(started)
    }

    /// Ends a call and completes the consultation.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::NotFound`] when no matching call exists,
    /// [`HealthPalError::Forbidden`] for non-participants, and
    /// [`HealthPalError::InvalidTransition`] for calls already ended.
    pub async fn end_call(
        &self,
        id: ConsultationId,
        modality: CallModality,
        actor: UserId,
        call_id: Option<CallId>,
        duration_seconds: Option<i64>,
    ) -> Result<EndedCall, HealthPalError> {
        let ended = self
            .store
            .end_call(id, modality, actor, call_id, duration_seconds, Utc::now())
            .await?;
        tracing::info!(
            consultation_id = %id,
            call_id = %ended.call.id,
            duration_seconds = ended.call.duration_seconds.unwrap_or_default(),
            "call ended"
        );
        Ok(ended)
    }

    /// Lists a consultation's calls of one modality. Participants only.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::NotFound`] or [`HealthPalError::Forbidden`].
    pub async fn list_calls(
        &self,
        id: ConsultationId,
        modality: CallModality,
        actor: UserId,
    ) -> Result<Vec<Call>, HealthPalError> {
        let consultation = self
            .store
            .get_consultation(id)
            .await?
            .ok_or_else(|| HealthPalError::not_found("consultation", id))?;
        consultation.require_participant(actor)?;
        self.store.list_calls(id, modality).await
    }

    /// Per-modality figures over the completed calls `user` started.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn call_stats(&self, user: UserId) -> Result<Vec<CallStats>, HealthPalError> {
        let calls = self.store.list_calls_by_initiator(user).await?;
        Ok([CallModality::Audio, CallModality::Video]
            .into_iter()
            .map(|m| CallStats::from_calls(m, &calls))
            .collect())
    }
}
