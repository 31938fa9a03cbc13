use async_trait::async_trait;
use sqlx::PgPool;

use super::{StoreError, UserStore};
use crate::db::pool::health_check;
use crate::models::user::{NewUser, User, UserFilter, UserPatch};

/// PostgreSQL-backed user store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Wraps an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>, StoreError> {
        Ok(User::find_one(&self.pool, filter).await?)
    }

    async fn update(&self, filter: &UserFilter, patch: UserPatch) -> Result<Option<User>, StoreError> {
        Ok(User::update(&self.pool, filter, patch).await?)
    }

    async fn create(&self, data: NewUser) -> Result<User, StoreError> {
        Ok(User::create(&self.pool, data).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(health_check(&self.pool).await?)
    }
}
