/// Bearer-token authentication
///
/// [`authenticate`] turns an `Authorization` header into the authenticated
/// user. A request is authenticated only if all of the following hold:
///
/// 1. The header has the form `Bearer <token>`
/// 2. The token is a valid, unexpired session JWT
/// 3. The user named by its subject exists
/// 4. The token is the one currently stored on that user
///
/// The last check is what makes logout immediate: once the stored token is
/// cleared, the old JWT is rejected even though its signature is still valid.
///
/// After successful authentication the router inserts an [`AuthContext`] into
/// the request extensions; handlers receive it as an extractor.
///
/// # Example
///
/// ```
/// use passgate_shared::auth::middleware::AuthContext;
///
/// async fn handler(auth: AuthContext) -> String {
///     format!("Hello, {}!", auth.user.email)
/// }
/// ```

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::jwt::{validate_token, JwtError};
use crate::models::user::{User, UserFilter};
use crate::store::UserStore;

/// Message returned for every authentication failure
pub const NOT_AUTHORIZED: &str = "Not authorized";

/// Authenticated identity attached to a request
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The user record, as loaded during authentication
    pub user: User,
}

/// Error type for bearer authentication
///
/// The variants are kept apart for logging; clients see a single 401.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No Authorization header
    #[error("Missing credentials")]
    MissingCredentials,

    /// Header present but not `Bearer <token>`
    #[error("Invalid authorization header: {0}")]
    InvalidFormat(String),

    /// Signature, expiry or issuer check failed
    #[error("Invalid token: {0}")]
    InvalidToken(#[from] JwtError),

    /// Token is valid but no longer the user's current session
    #[error("Session is no longer active")]
    Revoked,

    /// Storage failure while loading the user
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::DatabaseError(msg) => {
                tracing::error!("Authentication lookup failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal_error", "message": "An internal error occurred" })),
                )
                    .into_response()
            }
            other => {
                tracing::debug!(reason = %other, "Rejected request");
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "unauthorized", "message": NOT_AUTHORIZED })),
                )
                    .into_response()
            }
        }
    }
}

/// Extracts the token from an `Authorization` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingCredentials)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidFormat("Empty bearer token".to_string()));
    }

    Ok(token)
}

/// Resolves an `Authorization` header value to the authenticated user
///
/// # Errors
///
/// Any [`AuthError`]; all but `DatabaseError` mean "not authorized"
pub async fn authenticate(
    store: &dyn UserStore,
    secret: &str,
    header: Option<&str>,
) -> Result<AuthContext, AuthError> {
    let token = bearer_token(header)?;
    let claims = validate_token(token, secret)?;

    let user = store
        .find_one(&UserFilter::Id(claims.sub))
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?
        .ok_or(AuthError::Revoked)?;

    if user.token.as_deref() != Some(token) {
        return Err(AuthError::Revoked);
    }

    Ok(AuthContext { user })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}
