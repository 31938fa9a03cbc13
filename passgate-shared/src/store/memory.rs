use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StoreError, UserStore};
use crate::models::user::{NewUser, User, UserFilter, UserPatch};

/// In-memory user store
///
/// Enforces the same unique constraints as the `users` table, under the same
/// constraint names.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| filter.matches(u)).cloned())
    }

    async fn update(&self, filter: &UserFilter, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;

        let Some(user) = users.values_mut().find(|u| filter.matches(u)) else {
            return Ok(None);
        };

        patch.apply(user);
        Ok(Some(user.clone()))
    }

    async fn create(&self, data: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == data.email) {
            return Err(StoreError::UniqueViolation {
                constraint: "users_email_key".to_string(),
            });
        }
        if users
            .values()
            .any(|u| u.verification_token.as_deref() == Some(data.verification_token.as_str()))
        {
            return Err(StoreError::UniqueViolation {
                constraint: "users_verification_token_key".to_string(),
            });
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: data.email,
            password_hash: data.password_hash,
            subscription: data.subscription,
            avatar_url: data.avatar_url,
            verified: false,
            verification_token: Some(data.verification_token),
            token: None,
            created_at: now,
            updated_at: now,
        };

        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
