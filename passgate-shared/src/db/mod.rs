/// Database layer for Passgate
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: Embedded schema migrations (`migrations/` at the workspace root)
///
/// Queries live on the models, and the account flows reach them through
/// [`crate::store::UserStore`].

pub mod migrations;
pub mod pool;
