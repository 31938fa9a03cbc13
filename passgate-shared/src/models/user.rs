/// User model and database operations
///
/// This module provides the User record, the partial-update and lookup types
/// used by the account registry, and the PostgreSQL queries behind them.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     subscription VARCHAR(16) NOT NULL DEFAULT 'starter',
///     avatar_url VARCHAR(512) NOT NULL,
///     verified BOOLEAN NOT NULL DEFAULT FALSE,
///     verification_token VARCHAR(64) UNIQUE,
///     token TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use passgate_shared::models::user::{NewUser, Subscription, User, UserFilter};
/// use passgate_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(
///     &pool,
///     NewUser {
///         email: "a@x.com".to_string(),
///         password_hash: "$argon2id$...".to_string(),
///         subscription: Subscription::Starter,
///         avatar_url: "avatars/4b1c.jpg".to_string(),
///         verification_token: "V1StGXR8_Z5jdHi6B-myT".to_string(),
///     },
/// )
/// .await?;
///
/// let found = User::find_one(&pool, &UserFilter::Email("a@x.com".to_string())).await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, subscription, avatar_url, verified, \
                            verification_token, token, created_at, updated_at";

/// Subscription tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subscription {
    /// Free tier, assigned at registration
    #[default]
    Starter,

    /// Paid tier
    Pro,

    /// Paid tier for teams
    Business,
}

impl Subscription {
    /// Converts the tier to its database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Subscription::Starter => "starter",
            Subscription::Pro => "pro",
            Subscription::Business => "business",
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown subscription value read from the database
#[derive(Debug, thiserror::Error)]
#[error("Unknown subscription tier: {0}")]
pub struct UnknownSubscription(pub String);

impl TryFrom<String> for Subscription {
    type Error = UnknownSubscription;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "starter" => Ok(Subscription::Starter),
            "pro" => Ok(Subscription::Pro),
            "business" => Ok(Subscription::Business),
            _ => Err(UnknownSubscription(value)),
        }
    }
}

/// User account record
///
/// Secrets (`password_hash`, `verification_token`, `token`) are never serialized.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Email address, trimmed and lowercased; unique across all users
    pub email: String,

    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Subscription tier
    #[sqlx(try_from = "String")]
    pub subscription: Subscription,

    /// Local avatar path (`avatars/<file>.jpg`) or a remote fallback URL
    pub avatar_url: String,

    /// Whether the email address has been verified
    pub verified: bool,

    /// One-time verification token, present until verification succeeds
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,

    /// Current session token, present between login and logout
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// When the user account was created
    pub created_at: DateTime<Utc>,

    /// When the user account was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Normalized email address
    pub email: String,

    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,

    /// Initial subscription tier
    pub subscription: Subscription,

    /// Resolved avatar URL
    pub avatar_url: String,

    /// Verification token to email to the user
    pub verification_token: String,
}

/// Partial update of a user
///
/// Only `Some` fields are written. For nullable columns, `Some(None)` clears
/// the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    /// New subscription tier
    pub subscription: Option<Subscription>,

    /// New avatar URL
    pub avatar_url: Option<String>,

    /// New verification status
    pub verified: Option<bool>,

    /// New verification token (use Some(None) to clear)
    pub verification_token: Option<Option<String>>,

    /// New session token (use Some(None) to clear)
    pub token: Option<Option<String>>,
}

impl UserPatch {
    /// Marks the account verified and consumes the verification token
    pub fn mark_verified() -> Self {
        Self {
            verified: Some(true),
            verification_token: Some(None),
            ..Default::default()
        }
    }

    /// Stores a freshly issued session token
    pub fn session(token: String) -> Self {
        Self {
            token: Some(Some(token)),
            ..Default::default()
        }
    }

    /// Clears the session token
    pub fn clear_session() -> Self {
        Self {
            token: Some(None),
            ..Default::default()
        }
    }

    /// Applies the patch to an in-memory record
    pub fn apply(self, user: &mut User) {
        if let Some(subscription) = self.subscription {
            user.subscription = subscription;
        }
        if let Some(avatar_url) = self.avatar_url {
            user.avatar_url = avatar_url;
        }
        if let Some(verified) = self.verified {
            user.verified = verified;
        }
        if let Some(verification_token) = self.verification_token {
            user.verification_token = verification_token;
        }
        if let Some(token) = self.token {
            user.token = token;
        }
        user.updated_at = Utc::now();
    }
}

/// Lookup key selecting at most one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFilter {
    /// By primary key
    Id(Uuid),

    /// By normalized email address
    Email(String),

    /// By pending verification token
    VerificationToken(String),
}

impl UserFilter {
    /// Column the filter matches on
    pub fn column(&self) -> &'static str {
        match self {
            UserFilter::Id(_) => "id",
            UserFilter::Email(_) => "email",
            UserFilter::VerificationToken(_) => "verification_token",
        }
    }

    /// Whether the filter selects the given record
    pub fn matches(&self, user: &User) -> bool {
        match self {
            UserFilter::Id(id) => user.id == *id,
            UserFilter::Email(email) => user.email == *email,
            UserFilter::VerificationToken(token) => {
                user.verification_token.as_deref() == Some(token.as_str())
            }
        }
    }
}

/// Minimal projection returned by most endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub email: String,
    pub subscription: Subscription,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            subscription: user.subscription,
        }
    }
}

/// Projection returned by the avatar update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarSummary {
    #[serde(rename = "avatarURL")]
    pub avatar_url: String,
}

/// Normalizes an email address for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// Inserts a new user
    ///
    /// # Errors
    ///
    /// Returns the database error unchanged; a duplicate email surfaces as a
    /// unique violation on `users_email_key`.
    pub async fn create(pool: &PgPool, data: NewUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (email, password_hash, subscription, avatar_url, verification_token) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(data.email)
            .bind(data.password_hash)
            .bind(data.subscription.as_str())
            .bind(data.avatar_url)
            .bind(data.verification_token)
            .fetch_one(pool)
            .await
    }

    /// Finds the user matching `filter`
    pub async fn find_one(pool: &PgPool, filter: &UserFilter) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} = $1",
            filter.column()
        );

        let q = sqlx::query_as::<_, User>(&query);
        let q = match filter {
            UserFilter::Id(id) => q.bind(*id),
            UserFilter::Email(email) => q.bind(email.clone()),
            UserFilter::VerificationToken(token) => q.bind(token.clone()),
        };

        q.fetch_optional(pool).await
    }

    /// Applies `patch` to the user matching `filter`
    ///
    /// Only `Some` fields are written and `updated_at` is refreshed.
    ///
    /// # Returns
    ///
    /// The updated user, or `None` if nothing matched
    pub async fn update(
        pool: &PgPool,
        filter: &UserFilter,
        patch: UserPatch,
    ) -> Result<Option<Self>, sqlx::Error> {
        // $1 is the filter value, patch fields follow
        let mut query = String::from("UPDATE users SET updated_at = NOW()");
        let mut bind_count = 1;

        if patch.subscription.is_some() {
            bind_count += 1;
            query.push_str(&format!(", subscription = ${}", bind_count));
        }
        if patch.avatar_url.is_some() {
            bind_count += 1;
            query.push_str(&format!(", avatar_url = ${}", bind_count));
        }
        if patch.verified.is_some() {
            bind_count += 1;
            query.push_str(&format!(", verified = ${}", bind_count));
        }
        if patch.verification_token.is_some() {
            bind_count += 1;
            query.push_str(&format!(", verification_token = ${}", bind_count));
        }
        if patch.token.is_some() {
            bind_count += 1;
            query.push_str(&format!(", token = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE {} = $1 RETURNING {USER_COLUMNS}",
            filter.column()
        ));

        let q = sqlx::query_as::<_, User>(&query);
        let mut q = match filter {
            UserFilter::Id(id) => q.bind(*id),
            UserFilter::Email(email) => q.bind(email.clone()),
            UserFilter::VerificationToken(token) => q.bind(token.clone()),
        };

        if let Some(subscription) = patch.subscription {
            q = q.bind(subscription.as_str());
        }
        if let Some(avatar_url) = patch.avatar_url {
            q = q.bind(avatar_url);
        }
        if let Some(verified) = patch.verified {
            q = q.bind(verified);
        }
        if let Some(verification_token) = patch.verification_token {
            q = q.bind(verification_token);
        }
        if let Some(token) = patch.token {
            q = q.bind(token);
        }

        q.fetch_optional(pool).await
    }
}
