/// Database models for Passgate
///
/// # Models
///
/// - `user`: User accounts, partial updates, lookups and projections
///
/// # Example
///
/// ```no_run
/// use passgate_shared::models::user::{User, UserFilter, UserPatch};
/// use passgate_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example(user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// User::update(&pool, &UserFilter::Id(user_id), UserPatch::clear_session()).await?;
/// # Ok(())
/// # }
/// ```

pub mod user;
