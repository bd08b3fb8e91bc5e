//! User directory DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Role, UserId};

/// Request body for `POST /users`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterUserRequest {
    /// Display name.
    #[serde(alias = "fullName")]
    pub full_name: String,
    /// Contact email (unique).
    pub email: String,
    /// Optional phone number for SMS.
    #[serde(default)]
    pub phone: Option<String>,
    /// Role.
    pub role: Role,
}

/// Response body for `POST /users` (201 Created).
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserResponse {
    /// New user id.
    #[schema(value_type = uuid::Uuid)]
    pub user_id: UserId,
}
