//! User directory service.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{NewUser, UserId, UserProfile};
use crate::error::HealthPalError;
use crate::persistence::UserStore;

/// Registers and looks up directory users.
#[derive(Debug, Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    /// Creates a new `UserService`.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Validates and stores a new user.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::InvalidRequest`] for invalid fields and
    /// [`HealthPalError::Duplicate`] for a registered email.
    pub async fn register(&self, new: NewUser) -> Result<UserProfile, HealthPalError> {
        let user = UserProfile::register(new, Utc::now())?;
        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    /// Loads one user.
    ///
    /// # Errors
    ///
    /// Returns [`HealthPalError::NotFound`] for unknown ids.
    pub async fn get(&self, id: UserId) -> Result<UserProfile, HealthPalError> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| HealthPalError::not_found("user", id))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::persistence::MemoryStore;

    fn input(email: &str) -> NewUser {
        NewUser {
            full_name: "Huda Karim".to_string(),
            email: email.to_string(),
            phone: Some("+970599000111".to_string()),
            role: Role::Donor,
        }
    }

    #[tokio::test]
    async fn register_then_get() {
        let service = UserService::new(Arc::new(MemoryStore::new()));
        let Ok(user) = service.register(input("huda@example.org")).await else {
            panic!("registration accepted");
        };
        assert!(service.get(user.id).await.is_ok_and(|u| u == user));
        assert!(matches!(
            service.get(UserId::new()).await,
            Err(HealthPalError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn email_is_unique_case_insensitively() {
        let service = UserService::new(Arc::new(MemoryStore::new()));
        assert!(service.register(input("huda@example.org")).await.is_ok());
        assert!(matches!(
            service.register(input("HUDA@example.org")).await,
            Err(HealthPalError::Duplicate(_))
        ));
    }
}
