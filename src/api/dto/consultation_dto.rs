//! Consultation and call DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    Call, CallId, CallStats, Consultation, ConsultationId, ConsultationMode, ConsultationStatus,
    UserId,
};

/// Request body for `POST /consultations`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BookConsultationRequest {
    /// Requested doctor.
    #[schema(value_type = uuid::Uuid)]
    #[serde(alias = "doctorId")]
    pub doctor_id: UserId,
    /// Scheduled start (RFC 3339).
    #[serde(alias = "consultationDate", alias = "scheduled_time")]
    pub consultation_date: DateTime<Utc>,
    /// `chat`, `audio` or `video`.
    pub mode: ConsultationMode,
    /// Optional notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Response body for `POST /consultations` (201 Created).
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookConsultationResponse {
    /// New consultation id.
    #[schema(value_type = uuid::Uuid)]
    pub consultation_id: ConsultationId,
    /// Initial status (`pending`).
    pub status: ConsultationStatus,
}

/// Response body for `GET /consultations`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConsultationListResponse {
    /// The caller's consultations, by scheduled time.
    pub data: Vec<Consultation>,
}

/// Request body for `PATCH /consultations/{id}/status`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// Target status.
    pub status: ConsultationStatus,
}

/// Response body for `POST /consultations/{id}/{audio,video}-calls` (201).
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartCallResponse {
    /// New call id.
    #[schema(value_type = uuid::Uuid)]
    pub call_id: CallId,
    /// Owning consultation.
    #[schema(value_type = uuid::Uuid)]
    pub consultation_id: ConsultationId,
    /// Calls that were still active and got completed.
    #[schema(value_type = Vec<uuid::Uuid>)]
    pub force_ended: Vec<CallId>,
}

/// Request body for `PATCH /consultations/{id}/{audio,video}-calls/end`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct EndCallRequest {
    /// Call to end; defaults to the active call of the modality.
    #[schema(value_type = Option<uuid::Uuid>)]
    #[serde(default, alias = "callId")]
    pub call_id: Option<CallId>,
    /// Client-measured duration, at most one day; wins over the timestamps.
    #[serde(default, alias = "durationSeconds")]
    pub duration_seconds: Option<i64>,
}

/// Response body for the end-call endpoints.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndCallResponse {
    /// Ended call.
    #[schema(value_type = uuid::Uuid)]
    pub call_id: CallId,
    /// Final duration.
    pub duration_seconds: i64,
    /// Consultation status after the call.
    pub consultation_status: ConsultationStatus,
}

/// Response body for the call list endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct CallListResponse {
    /// Calls of the modality, newest first.
    pub data: Vec<Call>,
}

/// Response body for `GET /calls/stats`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CallStatsResponse {
    /// One entry per modality.
    pub data: Vec<CallStats>,
}
