/// Account registry persistence interface
///
/// The account service only talks to storage through [`UserStore`]:
/// find-one-by-filter, update-by-filter and create. Two backends exist:
///
/// - [`PgUserStore`]: PostgreSQL via sqlx (production)
/// - [`InMemoryUserStore`]: a process-local map with the same uniqueness rules
///   (tests and local experiments)
///
/// Email uniqueness is enforced by the backend, never by a lock in the
/// service. Concurrent registrations race at the backend and the loser gets
/// [`StoreError::UniqueViolation`].

use async_trait::async_trait;

use crate::models::user::{NewUser, User, UserFilter, UserPatch};

mod memory;
mod postgres;

pub use memory::InMemoryUserStore;
pub use postgres::PgUserStore;

/// PostgreSQL SQLSTATE for unique_violation
pub const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION_CODE) {
                return StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }

        StoreError::Database(err)
    }
}

/// Persistence operations needed by the account flows
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns the user matching `filter`, if any
    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>, StoreError>;

    /// Applies `patch` to the user matching `filter`
    ///
    /// Returns the updated record, or `None` if nothing matched.
    async fn update(&self, filter: &UserFilter, patch: UserPatch) -> Result<Option<User>, StoreError>;

    /// Persists a new user
    ///
    /// # Errors
    ///
    /// `StoreError::UniqueViolation` if the email (or verification token) is taken
    async fn create(&self, data: NewUser) -> Result<User, StoreError>;

    /// Checks that the backend is reachable
    async fn ping(&self) -> Result<(), StoreError>;
}
