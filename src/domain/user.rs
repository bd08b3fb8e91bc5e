//! Directory users and their roles.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;
use crate::error::HealthPalError;

/// Caller role carried in access tokens and the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Receives care and owns sponsorships.
    Patient,
    /// Runs consultations.
    Doctor,
    /// Funds sponsorships.
    Donor,
    /// Partner organisation.
    Ngo,
    /// Operator with refund and directory rights.
    Admin,
}

impl Role {
    /// Returns the storage / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Doctor => "doctor",
            Self::Donor => "donor",
            Self::Ngo => "ngo",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = HealthPalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Self::Patient),
            "doctor" => Ok(Self::Doctor),
            "donor" => Ok(Self::Donor),
            "ngo" => Ok(Self::Ngo),
            "admin" => Ok(Self::Admin),
            other => Err(HealthPalError::InvalidRequest(format!("unknown role: {other}"))),
        }
    }
}

/// Directory input for a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Display name.
    pub full_name: String,
    /// Contact email (unique).
    pub email: String,
    /// Optional phone number for SMS.
    pub phone: Option<String>,
    /// Role.
    pub role: Role,
}

/// A user directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserProfile {
    /// User identifier.
    #[schema(value_type = uuid::Uuid)]
    pub id: UserId,
    /// Display name.
    pub full_name: String,
    /// Contact email.
    pub email: String,
    /// Phone number.
    pub phone: Option<String>,
    /// Role.
    pub role: Role,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Validates `new` and builds a profile.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidRequest`] for an empty name or a
    /// malformed email.
    pub fn register(new: NewUser, now: DateTime<Utc>) -> Result<Self, HealthPalError> {
        let full_name = new.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(HealthPalError::InvalidRequest(
                "full_name is required".to_string(),
            ));
        }
        let email = new.email.trim().to_ascii_lowercase();
        let valid_email = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
        if !valid_email {
            return Err(HealthPalError::InvalidRequest(format!(
                "invalid email address: {:?}",
                new.email
            )));
        }
        let phone = new
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            id: UserId::new(),
            full_name,
            email,
            phone,
            role: new.role,
            created_at: now,
        })
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Caller identity.
    pub id: UserId,
    /// Caller role.
    pub role: Role,
}

impl Actor {
    /// Creates an actor.
    #[must_use]
    pub const fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    /// Returns `true` for operators.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Checks that the caller holds one of `allowed`.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::Forbidden`] otherwise.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), HealthPalError> {
        if allowed.contains(&self.role) {
            return Ok(());
        }
        let names: Vec<&str> = allowed.iter().map(|r| r.as_str()).collect();
        Err(HealthPalError::Forbidden(format!(
            "role {} may not perform this action (requires {})",
            self.role,
            names.join(" or ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(email: &str) -> NewUser {
        NewUser {
            full_name: " Lina Haddad ".to_string(),
            email: email.to_string(),
            phone: Some(String::new()),
            role: Role::Doctor,
        }
    }

    #[test]
    fn register_normalises_fields() {
        let profile = UserProfile::register(input("Lina@Example.org"), Utc::now());
        assert!(profile.is_ok_and(|p| {
            p.full_name == "Lina Haddad" && p.email == "lina@example.org" && p.phone.is_none()
        }));
    }

    #[test]
    fn register_rejects_bad_email() {
        assert!(UserProfile::register(input("nope"), Utc::now()).is_err());
        assert!(UserProfile::register(input("@example.org"), Utc::now()).is_err());
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Patient, Role::Doctor, Role::Donor, Role::Ngo, Role::Admin] {
            assert!(role.as_str().parse::<Role>().is_ok_and(|r| r == role));
        }
        assert!("nurse".parse::<Role>().is_err());
    }

    #[test]
    fn require_role_lists_allowed_roles() {
        let donor = Actor::new(UserId::new(), Role::Donor);
        assert!(donor.require_role(&[Role::Donor]).is_ok());
        assert!(matches!(
            donor.require_role(&[Role::Patient, Role::Admin]),
            Err(HealthPalError::Forbidden(msg)) if msg.contains("patient or admin")
        ));
    }
}
