/// Account endpoints
///
/// # Endpoints
///
/// - `POST  /api/auth/register` - Register new user (multipart)
/// - `GET   /api/auth/verify/:token` - Verify email address
/// - `POST  /api/auth/verify` - Resend verification email
/// - `POST  /api/auth/login` - Login and get a session token
/// - `POST  /api/auth/logout` - End the current session
/// - `GET   /api/auth/current` - Current user
/// - `PATCH /api/auth/subscription` - Change subscription tier
/// - `PATCH /api/auth/avatars` - Replace avatar (multipart)

use crate::{
    app::AppState,
    error::ApiResult,
    extractors::{read_avatar_form, read_register_form, ApiJson},
};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use passgate_shared::{
    accounts::{LoginInput, ResendInput},
    auth::middleware::AuthContext,
    models::user::{AvatarSummary, Subscription, UserSummary},
};
use serde::{Deserialize, Serialize};

/// Wrapper for responses shaped `{ "user": ... }`
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse<T> {
    pub user: T,
}

/// Response carrying only a message
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Session token (24h by default)
    pub token: String,

    pub user: UserSummary,
}

/// Subscription update request
///
/// Only the `subscription` field is accepted.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionRequest {
    pub subscription: Subscription,
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/register
/// Content-Type: multipart/form-data
///
/// email=a@x.com, password=secret123, subscription=pro (optional), avatar=<file> (optional)
/// ```
///
/// # Response
///
/// `201 Created`
///
/// ```json
/// { "user": { "email": "a@x.com", "subscription": "starter" } }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed or avatar rejected
/// - `409 Conflict`: Email in use
pub async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UserResponse<UserSummary>>)> {
    let form = read_register_form(multipart, state.accounts.avatars()).await?;

    let user = state.accounts.register(form.input, form.avatar).await?;

    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

/// Verify an email address
///
/// # Errors
///
/// - `404 Not Found`: Unknown token, or the account is already verified
pub async fn verify(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.accounts.verify(&token).await?;

    Ok(Json(MessageResponse {
        message: "Verification successful".to_string(),
    }))
}

/// Resend the verification email
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/verify
/// { "email": "a@x.com" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Invalid body, unknown email, or already verified
/// - `503 Service Unavailable`: Email could not be sent
pub async fn resend_verification(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResendInput>,
) -> ApiResult<Json<MessageResponse>> {
    state.accounts.resend_verification(req).await?;

    Ok(Json(MessageResponse {
        message: "Verification email sent".to_string(),
    }))
}

/// Login with email and password
///
/// # Response
///
/// ```json
/// { "token": "eyJ...", "user": { "email": "a@x.com", "subscription": "starter" } }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `401 Unauthorized`: Bad credentials or email not verified
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginInput>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = state.accounts.login(req).await?;

    Ok(Json(LoginResponse {
        token: outcome.token,
        user: outcome.user,
    }))
}

/// End the current session
///
/// `204 No Content`; the session token stops working immediately.
pub async fn logout(State(state): State<AppState>, auth: AuthContext) -> ApiResult<StatusCode> {
    state.accounts.logout(auth.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Current user
pub async fn current(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<UserResponse<UserSummary>>> {
    Ok(Json(UserResponse {
        user: state.accounts.current(&auth.user),
    }))
}

/// Change the subscription tier
///
/// # Errors
///
/// - `400 Bad Request`: Body is not exactly `{ "subscription": "starter" | "pro" | "business" }`
pub async fn set_subscription(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<SubscriptionRequest>,
) -> ApiResult<Json<UserResponse<UserSummary>>> {
    let user = state
        .accounts
        .set_subscription(auth.user.id, req.subscription)
        .await?;

    Ok(Json(UserResponse { user }))
}

/// Replace the avatar
///
/// # Response
///
/// ```json
/// { "user": { "avatarURL": "avatars/0c8e1c52-....jpg" } }
/// ```
pub async fn update_avatar(
    State(state): State<AppState>,
    auth: AuthContext,
    multipart: Multipart,
) -> ApiResult<Json<UserResponse<AvatarSummary>>> {
    let staged = read_avatar_form(multipart, state.accounts.avatars()).await?;

    let user = state.accounts.update_avatar(&auth.user, staged).await?;

    Ok(Json(UserResponse { user }))
}
