//! Audio / video call sessions nested in a consultation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{CallId, ConsultationId, UserId};
use crate::error::HealthPalError;

/// Transport of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallModality {
    /// Audio only.
    Audio,
    /// Audio and video.
    Video,
}

impl CallModality {
    /// Returns the storage / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for CallModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallModality {
    type Err = HealthPalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(HealthPalError::InvalidRequest(format!(
                "unknown call modality: {other}"
            ))),
        }
    }
}

/// Call lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Running.
    Active,
    /// Ended; terminal.
    Completed,
}

impl CallStatus {
    /// Returns the storage / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = HealthPalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(HealthPalError::InvalidRequest(format!(
                "unknown call status: {other}"
            ))),
        }
    }
}

/// An audio or video session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Call {
    /// Call identifier.
    #[schema(value_type = uuid::Uuid)]
    pub id: CallId,
    /// Owning consultation.
    #[schema(value_type = uuid::Uuid)]
    pub consultation_id: ConsultationId,
    /// Participant who started the call.
    #[schema(value_type = uuid::Uuid)]
    pub initiator_id: UserId,
    /// Audio or video.
    pub modality: CallModality,
    /// Lifecycle status.
    pub status: CallStatus,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// End timestamp, once ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Length in seconds, once ended.
    pub duration_seconds: Option<i64>,
}

impl Call {
    /// Builds an `active` call starting at `now`.
    #[must_use]
    pub fn start(
        consultation_id: ConsultationId,
        initiator_id: UserId,
        modality: CallModality,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CallId::new(),
            consultation_id,
            initiator_id,
            modality,
            status: CallStatus::Active,
            started_at: now,
            ended_at: None,
            duration_seconds: None,
        }
    }

    /// Ends the call at `now`. A client-supplied duration wins over the
    /// timestamp difference.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidTransition`] if the call already
    /// ended and [`HealthPalError::InvalidRequest`] for a duration outside
    /// `0..=MAX_CALL_DURATION_SECS`.
    pub fn finish(
        &mut self,
        now: DateTime<Utc>,
        explicit_duration: Option<i64>,
    ) -> Result<i64, HealthPalError> {
        if self.status != CallStatus::Active {
            return Err(HealthPalError::InvalidTransition {
                entity: "call",
                from: self.status.to_string(),
                to: CallStatus::Completed.to_string(),
            });
        }
        if explicit_duration.is_some_and(|d| !(0..=MAX_CALL_DURATION_SECS).contains(&d)) {
            return Err(HealthPalError::InvalidRequest(format!(
                "duration_seconds must be between 0 and {MAX_CALL_DURATION_SECS}"
            )));
        }

        let duration = explicit_duration
            .unwrap_or_else(|| now.signed_duration_since(self.started_at).num_seconds().max(0));
        self.status = CallStatus::Completed;
        self.ended_at = Some(now);
        self.duration_seconds = Some(duration);
        Ok(duration)
    }
}

/// Longest duration a client may report for one call (one day).
pub const MAX_CALL_DURATION_SECS: i64 = 24 * 60 * 60;

/// Aggregate figures for one modality.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CallStats {
    /// Audio or video.
    pub modality: CallModality,
    /// Number of completed calls.
    pub total_calls: u64,
    /// Mean duration in seconds.
    pub average_duration_seconds: Option<f64>,
    /// Summed duration in seconds.
    pub total_duration_seconds: i64,
}

impl CallStats {
    /// Computes stats over the completed `modality` calls in `calls`.
    #[must_use]
    pub fn from_calls(modality: CallModality, calls: &[Call]) -> Self {
        let durations: Vec<i64> = calls
            .iter()
            .filter(|c| c.modality == modality && c.status == CallStatus::Completed)
            .map(|c| c.duration_seconds.unwrap_or(0))
            .collect();
        let total = durations
            .iter()
            .fold(0_i64, |acc, d| acc.saturating_add(*d));
        #[allow(clippy::cast_precision_loss)]
        let average = (!durations.is_empty()).then(|| total as f64 / durations.len() as f64);
        Self {
            modality,
            total_calls: durations.len() as u64,
            average_duration_seconds: average,
            total_duration_seconds: total,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn duration_is_derived_from_timestamps() {
        let t = Utc::now();
        let mut call = Call::start(ConsultationId::new(), UserId::new(), CallModality::Video, t);
        let Ok(duration) = call.finish(t + Duration::seconds(125), None) else {
            panic!("active call ends");
        };
        assert_eq!(duration, 125);
        assert_eq!(call.duration_seconds, Some(125));
        assert_eq!(call.ended_at, Some(t + Duration::seconds(125)));
        assert_eq!(call.status, CallStatus::Completed);
    }

    #[test]
    fn explicit_duration_takes_precedence() {
        let t = Utc::now();
        let mut call = Call::start(ConsultationId::new(), UserId::new(), CallModality::Audio, t);
        let Ok(duration) = call.finish(t + Duration::seconds(10), Some(42)) else {
            panic!("active call ends");
        };
        assert_eq!(duration, 42);
    }

    #[test]
    fn ended_call_cannot_end_again() {
        let t = Utc::now();
        let mut call = Call::start(ConsultationId::new(), UserId::new(), CallModality::Audio, t);
        assert!(call.finish(t, Some(-1)).is_err());
        assert!(call.finish(t, None).is_ok());
        assert!(matches!(
            call.finish(t, None),
            Err(HealthPalError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn stats_filter_by_modality() {
        let t = Utc::now();
        let consultation = ConsultationId::new();
        let user = UserId::new();
        let mut calls = Vec::new();
        for secs in [60, 120] {
            let mut c = Call::start(consultation, user, CallModality::Video, t);
            let _ = c.finish(t + Duration::seconds(secs), None);
            calls.push(c);
        }
        calls.push(Call::start(consultation, user, CallModality::Video, t));
        let mut audio = Call::start(consultation, user, CallModality::Audio, t);
        let _ = audio.finish(t, Some(30));
        calls.push(audio);

        let video = CallStats::from_calls(CallModality::Video, &calls);
        assert_eq!(video.total_calls, 2);
        assert_eq!(video.total_duration_seconds, 180);
        assert_eq!(video.average_duration_seconds, Some(90.0));

        let audio = CallStats::from_calls(CallModality::Audio, &calls);
        assert_eq!(audio.total_calls, 1);
    }

    #[test]
    fn reported_duration_is_capped() {
        let t = Utc::now();
        let mut call = Call::start(ConsultationId::new(), UserId::new(), CallModality::Audio, t);
        assert!(matches!(
            call.finish(t, Some(i64::MAX)),
            Err(HealthPalError::InvalidRequest(_))
        ));
        assert_eq!(call.status, CallStatus::Active);
        assert!(call.finish(t, Some(MAX_CALL_DURATION_SECS)).is_ok());
    }

    #[test]
    fn stats_saturate_on_huge_stored_durations() {
        let t = Utc::now();
        let consultation = ConsultationId::new();
        let user = UserId::new();
        let calls: Vec<Call> = (0..2)
            .map(|_| {
                let mut c = Call::start(consultation, user, CallModality::Audio, t);
                let _ = c.finish(t, Some(0));
                c.duration_seconds = Some(i64::MAX);
                c
            })
            .collect();
        let stats = CallStats::from_calls(CallModality::Audio, &calls);
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.total_duration_seconds, i64::MAX);
    }
}
