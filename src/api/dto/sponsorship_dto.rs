//! Sponsorship DTOs: create, list, detail and close.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common_dto::PaginationMeta;
use crate::domain::{Amount, FundingStats, Sponsorship, SponsorshipId, SponsorshipStatus, Transaction};

/// Request body for `POST /sponsorships`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSponsorshipRequest {
    /// Treatment being funded.
    pub treatment_type: String,
    /// Target amount, as a number or decimal string.
    #[schema(value_type = String, example = "1500.00")]
    pub goal_amount: Amount,
    /// Free-text description.
    pub description: String,
}

/// Response body for `POST /sponsorships` (201 Created).
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSponsorshipResponse {
    /// New campaign id.
    #[schema(value_type = uuid::Uuid)]
    pub sponsorship_id: SponsorshipId,
    /// Initial status (`open`).
    pub status: SponsorshipStatus,
}

/// Paginated list response for `GET /sponsorships`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SponsorshipListResponse {
    /// Open campaigns on this page, newest first.
    pub data: Vec<Sponsorship>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Response body for `GET /sponsorships/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SponsorshipDetailResponse {
    /// The campaign.
    pub sponsorship: Sponsorship,
    /// Completed donations, newest first.
    pub donations: Vec<Transaction>,
    /// Figures over the listed donations.
    pub statistics: FundingStats,
}
