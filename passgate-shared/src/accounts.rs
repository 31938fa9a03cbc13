/// Account service
///
/// [`AccountService`] implements every account flow on top of the
/// collaborators in this crate: the [`UserStore`], the password and JWT
/// helpers, a [`Mailer`] and [`AvatarStorage`]. HTTP handlers do no more than
/// decode requests, call one method here and encode the result.
///
/// # Lifecycle
///
/// ```text
/// register ──> unverified ──verify──> verified ──login──> session
///                  │                                        │
///                  └──resend (same token)          logout ──┘
/// ```
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use passgate_shared::accounts::{AccountService, AccountSettings, LoginInput, RegisterInput};
/// use passgate_shared::avatar::AvatarStorage;
/// use passgate_shared::mail::LogMailer;
/// use passgate_shared::store::InMemoryUserStore;
///
/// # async fn example() -> Result<(), passgate_shared::accounts::AccountError> {
/// let accounts = AccountService::new(
///     Arc::new(InMemoryUserStore::new()),
///     Arc::new(LogMailer),
///     AvatarStorage::new("tmp", "public/avatars"),
///     AccountSettings::new("http://localhost:3000", "a-secret-of-at-least-32-characters!!"),
/// );
///
/// let input = RegisterInput {
///     email: "a@x.com".to_string(),
///     password: "secret123".to_string(),
///     subscription: None,
/// };
/// let user = accounts.register(input, None).await?;
/// assert_eq!(user.email, "a@x.com");
/// # Ok(())
/// # }
/// ```

use chrono::Duration;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::auth::jwt::{create_token, Claims, JwtError, DEFAULT_EXPIRY_HOURS};
use crate::auth::middleware::{authenticate, AuthContext, AuthError};
use crate::auth::password::{hash_password, verify_password, PasswordError};
use crate::avatar::{gravatar_url, AvatarError, AvatarStorage, StagedUpload};
use crate::mail::{MailError, Mailer};
use crate::models::user::{
    normalize_email, AvatarSummary, NewUser, Subscription, User, UserFilter, UserPatch, UserSummary,
};
use crate::store::{StoreError, UserStore};
use crate::verification::{generate_verification_token, verification_email};

pub const EMAIL_IN_USE: &str = "Email in use";
pub const BAD_CREDENTIALS: &str = "Email or password is wrong";
pub const EMAIL_NOT_VERIFIED: &str = "Email not verified";
pub const VERIFICATION_NOT_FOUND: &str = "User not found or already verified";
pub const EMAIL_NOT_FOUND: &str = "Email not found";
pub const ALREADY_VERIFIED: &str = "Verification has already been passed";

/// Constraint name of the unique email index
const EMAIL_CONSTRAINT: &str = "users_email_key";

/// Error type for account operations
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// Input failed field validation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// Request is well-formed but not applicable
    #[error("{0}")]
    BadRequest(String),

    /// Email already registered
    #[error("{0}")]
    Conflict(String),

    /// Bad credentials, unverified account or invalid session
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// Verification email could not be delivered
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Token error: {0}")]
    Token(#[from] JwtError),

    /// Upload rejected or could not be stored
    #[error("Avatar error: {0}")]
    Avatar(#[from] AvatarError),

    /// Bearer authentication failed
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
}

/// Registration input
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 6, max = 128, message = "Password must be 6 to 128 characters"))]
    pub password: String,

    /// Initial tier; `starter` when absent
    pub subscription: Option<Subscription>,
}

/// Login input
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Verification resend input
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResendInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

impl RegisterInput {
    /// Same input with the email trimmed and lowercased
    pub fn normalized(self) -> Self {
        Self {
            email: normalize_email(&self.email),
            ..self
        }
    }
}

impl LoginInput {
    pub fn normalized(self) -> Self {
        Self {
            email: normalize_email(&self.email),
            ..self
        }
    }
}

impl ResendInput {
    pub fn normalized(self) -> Self {
        Self {
            email: normalize_email(&self.email),
        }
    }
}

/// Successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Signed session token, also stored on the user
    pub token: String,
    pub user: UserSummary,
}

/// Construction-time settings of the account service
#[derive(Debug, Clone)]
pub struct AccountSettings {
    /// Public base URL used in verification links
    pub base_url: String,

    /// HMAC secret for session tokens
    pub jwt_secret: String,

    /// Session token lifetime
    pub token_ttl: Duration,
}

impl AccountSettings {
    /// Settings with the default 24 hour session lifetime
    pub fn new(base_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            jwt_secret: jwt_secret.into(),
            token_ttl: Duration::hours(DEFAULT_EXPIRY_HOURS),
        }
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }
}

/// Orchestrates registration, verification, sessions and profile updates
pub struct AccountService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    avatars: AvatarStorage,
    settings: AccountSettings,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        avatars: AvatarStorage,
        settings: AccountSettings,
    ) -> Self {
        Self {
            store,
            mailer,
            avatars,
            settings,
        }
    }

    pub fn store(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    pub fn avatars(&self) -> &AvatarStorage {
        &self.avatars
    }

    /// Registers a new, unverified account and emails its verification link
    ///
    /// A staged upload becomes the avatar; without one the gravatar fallback
    /// is used. The staged file never outlives this call.
    ///
    /// # Errors
    ///
    /// - `AccountError::Validation` for a malformed email or password
    /// - `AccountError::Conflict` if the email is already registered
    /// - `AccountError::Avatar` if the upload is not a decodable image
    ///
    /// A failed verification email is logged, not returned.
    pub async fn register(
        &self,
        input: RegisterInput,
        avatar: Option<StagedUpload>,
    ) -> Result<UserSummary, AccountError> {
        let input = input.normalized();
        let prepared = match self.prepare_registration(&input).await {
            Ok(prepared) => prepared,
            Err(e) => {
                if let Some(staged) = avatar {
                    self.avatars.discard(staged).await;
                }
                return Err(e);
            }
        };

        let avatar_url = match avatar {
            Some(staged) => self.avatars.persist(staged).await?,
            None => gravatar_url(&prepared.email),
        };

        let verification_token = generate_verification_token();
        let created = self
            .store
            .create(NewUser {
                email: prepared.email.clone(),
                password_hash: prepared.password_hash,
                subscription: input.subscription.unwrap_or_default(),
                avatar_url: avatar_url.clone(),
                verification_token: verification_token.clone(),
            })
            .await;

        let user = match created {
            Ok(user) => user,
            Err(e) => {
                // Lost a registration race: the record was never written
                self.avatars.remove(&avatar_url).await;
                return Err(match e {
                    StoreError::UniqueViolation { constraint } if constraint == EMAIL_CONSTRAINT => {
                        AccountError::Conflict(EMAIL_IN_USE.to_string())
                    }
                    other => AccountError::Store(other),
                });
            }
        };

        info!(user_id = %user.id, "Registered user");

        let email = verification_email(&user.email, &self.settings.base_url, &verification_token);
        if let Err(e) = self.mailer.send(email).await {
            warn!(user_id = %user.id, error = %e, "Failed to send verification email");
        }

        Ok(UserSummary::from(&user))
    }

    /// Validation, duplicate check and hashing; nothing is written
    async fn prepare_registration(&self, input: &RegisterInput) -> Result<PreparedRegistration, AccountError> {
        input.validate()?;

        let email = input.email.clone();
        if self.store.find_one(&UserFilter::Email(email.clone())).await?.is_some() {
            debug!("Registration rejected, email in use");
            return Err(AccountError::Conflict(EMAIL_IN_USE.to_string()));
        }

        let password_hash = hash_password(&input.password)?;

        Ok(PreparedRegistration { email, password_hash })
    }

    /// Consumes a verification token
    ///
    /// # Errors
    ///
    /// `AccountError::NotFound` if no account holds the token, including when
    /// it was already used
    pub async fn verify(&self, token: &str) -> Result<(), AccountError> {
        let user = self
            .store
            .update(&UserFilter::VerificationToken(token.to_string()), UserPatch::mark_verified())
            .await?
            .ok_or_else(|| AccountError::NotFound(VERIFICATION_NOT_FOUND.to_string()))?;

        info!(user_id = %user.id, "Email verified");
        Ok(())
    }

    /// Sends the verification email again
    ///
    /// The stored token is reused, so earlier links stay valid and repeated
    /// calls are harmless.
    ///
    /// # Errors
    ///
    /// - `AccountError::BadRequest` for an unknown or already verified email
    /// - `AccountError::Mail` if the email could not be sent
    pub async fn resend_verification(&self, input: ResendInput) -> Result<(), AccountError> {
        let input = input.normalized();
        input.validate()?;

        let user = self
            .store
            .find_one(&UserFilter::Email(input.email))
            .await?
            .ok_or_else(|| AccountError::BadRequest(EMAIL_NOT_FOUND.to_string()))?;

        if user.verified {
            return Err(AccountError::BadRequest(ALREADY_VERIFIED.to_string()));
        }

        let token = match user.verification_token.clone() {
            Some(token) => token,
            None => {
                // Unverified accounts always carry a token; restore one if lost
                let token = generate_verification_token();
                let patch = UserPatch {
                    verification_token: Some(Some(token.clone())),
                    ..Default::default()
                };
                self.store.update(&UserFilter::Id(user.id), patch).await?;
                token
            }
        };

        self.mailer
            .send(verification_email(&user.email, &self.settings.base_url, &token))
            .await?;

        debug!(user_id = %user.id, "Resent verification email");
        Ok(())
    }

    /// Checks credentials and opens a session
    ///
    /// Unknown email and wrong password fail with the same message.
    ///
    /// # Errors
    ///
    /// `AccountError::Unauthorized` with [`BAD_CREDENTIALS`] or, for a correct
    /// password on an unverified account, [`EMAIL_NOT_VERIFIED`]
    pub async fn login(&self, input: LoginInput) -> Result<LoginOutcome, AccountError> {
        let input = input.normalized();
        input.validate()?;

        let Some(user) = self.store.find_one(&UserFilter::Email(input.email.clone())).await? else {
            return Err(AccountError::Unauthorized(BAD_CREDENTIALS.to_string()));
        };

        if !verify_password(&input.password, &user.password_hash)? {
            debug!(user_id = %user.id, "Login rejected, wrong password");
            return Err(AccountError::Unauthorized(BAD_CREDENTIALS.to_string()));
        }

        if !user.verified {
            return Err(AccountError::Unauthorized(EMAIL_NOT_VERIFIED.to_string()));
        }

        let claims = Claims::with_expiration(user.id, self.settings.token_ttl);
        let token = create_token(&claims, &self.settings.jwt_secret)?;

        let user = self
            .store
            .update(&UserFilter::Id(user.id), UserPatch::session(token.clone()))
            .await?
            .ok_or_else(|| AccountError::Unauthorized(BAD_CREDENTIALS.to_string()))?;

        info!(user_id = %user.id, "User logged in");

        Ok(LoginOutcome {
            token,
            user: UserSummary::from(&user),
        })
    }

    /// Ends the current session of `user_id`
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AccountError> {
        self.store
            .update(&UserFilter::Id(user_id), UserPatch::clear_session())
            .await?;

        info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Projection of an authenticated user
    pub fn current(&self, user: &User) -> UserSummary {
        UserSummary::from(user)
    }

    /// Changes the subscription tier of `user_id`
    pub async fn set_subscription(
        &self,
        user_id: Uuid,
        subscription: Subscription,
    ) -> Result<UserSummary, AccountError> {
        let patch = UserPatch {
            subscription: Some(subscription),
            ..Default::default()
        };

        let user = self
            .store
            .update(&UserFilter::Id(user_id), patch)
            .await?
            .ok_or_else(|| AccountError::NotFound("User not found".to_string()))?;

        info!(user_id = %user.id, subscription = %subscription, "Subscription updated");
        Ok(UserSummary::from(&user))
    }

    /// Replaces the avatar of `user` with a staged upload
    ///
    /// A previous local avatar file is removed best-effort once the new one is
    /// stored; a fallback URL is left alone.
    pub async fn update_avatar(&self, user: &User, staged: StagedUpload) -> Result<AvatarSummary, AccountError> {
        let avatar_url = self.avatars.persist(staged).await?;

        let patch = UserPatch {
            avatar_url: Some(avatar_url.clone()),
            ..Default::default()
        };

        let updated = match self.store.update(&UserFilter::Id(user.id), patch).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.avatars.remove(&avatar_url).await;
                return Err(AccountError::NotFound("User not found".to_string()));
            }
            Err(e) => {
                self.avatars.remove(&avatar_url).await;
                return Err(e.into());
            }
        };

        self.avatars.remove(&user.avatar_url).await;

        info!(user_id = %user.id, "Avatar updated");
        Ok(AvatarSummary {
            avatar_url: updated.avatar_url,
        })
    }

    /// Resolves an `Authorization` header to the session's user
    pub async fn authenticate(&self, header: Option<&str>) -> Result<AuthContext, AuthError> {
        authenticate(self.store.as_ref(), &self.settings.jwt_secret, header).await
    }
}

struct PreparedRegistration {
    email: String,
    password_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::is_local_avatar;
    use crate::mail::RecordingMailer;
    use crate::store::InMemoryUserStore;
    use bytes::Bytes;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    struct Harness {
        accounts: AccountService,
        store: Arc<InMemoryUserStore>,
        mailer: Arc<RecordingMailer>,
        _dir: tempfile::TempDir,
    }

    async fn harness_with(mailer: RecordingMailer) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let avatars = AvatarStorage::new(dir.path().join("tmp"), dir.path().join("public/avatars"));
        avatars.ensure_dirs().await.unwrap();

        let store = Arc::new(InMemoryUserStore::new());
        let mailer = Arc::new(mailer);
        let accounts = AccountService::new(
            store.clone(),
            mailer.clone(),
            avatars,
            AccountSettings::new("http://localhost:3000", SECRET),
        );

        Harness {
            accounts,
            store,
            mailer,
            _dir: dir,
        }
    }

    async fn harness() -> Harness {
        harness_with(RecordingMailer::new()).await
    }

    fn register_input(email: &str) -> RegisterInput {
        RegisterInput {
            email: email.to_string(),
            password: "secret123".to_string(),
            subscription: None,
        }
    }

    fn login_input(email: &str, password: &str) -> LoginInput {
        LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn png() -> Bytes {
        let img = ImageBuffer::from_pixel(16, 16, Rgba([10u8, 200, 10, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        Bytes::from(out.into_inner())
    }

    async fn stored(h: &Harness, email: &str) -> User {
        h.store
            .find_one(&UserFilter::Email(email.to_string()))
            .await
            .unwrap()
            .expect("user should exist")
    }

    async fn register_verified(h: &Harness, email: &str) -> User {
        h.accounts.register(register_input(email), None).await.unwrap();
        let token = stored(h, email).await.verification_token.unwrap();
        h.accounts.verify(&token).await.unwrap();
        stored(h, email).await
    }

    #[tokio::test]
    async fn test_register_uses_gravatar_and_sends_link() {
        let h = harness().await;

        let summary = h.accounts.register(register_input("a@x.com"), None).await.unwrap();
        assert_eq!(summary.email, "a@x.com");
        assert_eq!(summary.subscription, Subscription::Starter);

        let user = stored(&h, "a@x.com").await;
        assert_eq!(user.avatar_url, gravatar_url("a@x.com"));
        assert!(!user.verified);
        assert!(user.token.is_none());
        assert_ne!(user.password_hash, "secret123");

        let token = user.verification_token.unwrap();
        let sent = h.mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
        assert!(sent[0].html.contains(&format!("/api/auth/verify/{}", token)));
    }

    #[tokio::test]
    async fn test_register_normalizes_email() {
        let h = harness().await;

        let summary = h.accounts.register(register_input("  A@X.com "), None).await.unwrap();
        assert_eq!(summary.email, "a@x.com");

        let err = h.accounts.register(register_input("a@x.com"), None).await.unwrap_err();
        assert!(matches!(err, AccountError::Conflict(ref m) if m == EMAIL_IN_USE));
    }

    #[tokio::test]
    async fn test_login_and_resend_accept_padded_email() {
        let h = harness().await;
        register_verified(&h, "a@x.com").await;
        h.accounts.register(register_input("b@x.com"), None).await.unwrap();

        let outcome = h.accounts.login(login_input(" A@X.com  ", "secret123")).await.unwrap();
        assert_eq!(outcome.user.email, "a@x.com");

        h.accounts
            .resend_verification(ResendInput { email: "  B@x.COM ".to_string() })
            .await
            .unwrap();
        let sent = h.mailer.sent().await;
        assert_eq!(sent.last().unwrap().to, "b@x.com");
    }

    #[tokio::test]
    async fn test_register_twice_conflicts_and_keeps_one_user() {
        let h = harness().await;

        h.accounts.register(register_input("a@x.com"), None).await.unwrap();
        let err = h.accounts.register(register_input("a@x.com"), None).await.unwrap_err();

        assert!(matches!(err, AccountError::Conflict(ref m) if m == EMAIL_IN_USE));
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_discards_staged_upload() {
        let h = harness().await;
        h.accounts.register(register_input("a@x.com"), None).await.unwrap();

        let staged = h.accounts.avatars().stage(Some("image/png"), png()).await.unwrap();
        let staged_path = staged.path().to_path_buf();

        let err = h.accounts.register(register_input("a@x.com"), Some(staged)).await.unwrap_err();
        assert!(matches!(err, AccountError::Conflict(_)));
        assert!(!staged_path.exists());
    }

    #[tokio::test]
    async fn test_register_with_avatar_stores_local_file() {
        let h = harness().await;

        let staged = h.accounts.avatars().stage(Some("image/png"), png()).await.unwrap();
        h.accounts.register(register_input("a@x.com"), Some(staged)).await.unwrap();

        let user = stored(&h, "a@x.com").await;
        assert!(is_local_avatar(&user.avatar_url));
        assert!(h.accounts.avatars().local_path(&user.avatar_url).unwrap().exists());
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_input() {
        let h = harness().await;

        let mut input = register_input("not-an-email");
        let err = h.accounts.register(input.clone(), None).await.unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));

        input.email = "a@x.com".to_string();
        input.password = "123".to_string();
        let err = h.accounts.register(input, None).await.unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));

        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_register_survives_mail_failure() {
        let h = harness_with(RecordingMailer::failing()).await;

        h.accounts.register(register_input("a@x.com"), None).await.unwrap();
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unverified_user_cannot_login() {
        let h = harness().await;
        h.accounts.register(register_input("a@x.com"), None).await.unwrap();

        let err = h.accounts.login(login_input("a@x.com", "secret123")).await.unwrap_err();
        assert!(matches!(err, AccountError::Unauthorized(ref m) if m == EMAIL_NOT_VERIFIED));
    }

    #[tokio::test]
    async fn test_verify_consumes_token_once() {
        let h = harness().await;
        h.accounts.register(register_input("a@x.com"), None).await.unwrap();
        let token = stored(&h, "a@x.com").await.verification_token.unwrap();

        h.accounts.verify(&token).await.unwrap();

        let user = stored(&h, "a@x.com").await;
        assert!(user.verified);
        assert!(user.verification_token.is_none());

        let err = h.accounts.verify(&token).await.unwrap_err();
        assert!(matches!(err, AccountError::NotFound(ref m) if m == VERIFICATION_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_fail_identically() {
        let h = harness().await;
        register_verified(&h, "a@x.com").await;

        let wrong = h.accounts.login(login_input("a@x.com", "nope-nope")).await.unwrap_err();
        let unknown = h.accounts.login(login_input("b@x.com", "secret123")).await.unwrap_err();

        assert!(matches!(wrong, AccountError::Unauthorized(_)));
        assert!(matches!(unknown, AccountError::Unauthorized(_)));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.to_string(), BAD_CREDENTIALS);
    }

    #[tokio::test]
    async fn test_login_then_logout_revokes_token() {
        let h = harness().await;
        register_verified(&h, "a@x.com").await;

        let outcome = h.accounts.login(login_input("A@x.com", "secret123")).await.unwrap();
        assert_eq!(outcome.user.email, "a@x.com");

        let header = format!("Bearer {}", outcome.token);
        let ctx = h.accounts.authenticate(Some(&header)).await.unwrap();
        assert_eq!(h.accounts.current(&ctx.user), outcome.user);

        h.accounts.logout(ctx.user.id).await.unwrap();
        assert!(stored(&h, "a@x.com").await.token.is_none());

        let err = h.accounts.authenticate(Some(&header)).await.unwrap_err();
        assert!(matches!(err, AuthError::Revoked));
    }

    #[tokio::test]
    async fn test_resend_verification_rules() {
        let h = harness().await;

        let err = h
            .accounts
            .resend_verification(ResendInput { email: "b@x.com".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::BadRequest(ref m) if m == EMAIL_NOT_FOUND));

        h.accounts.register(register_input("a@x.com"), None).await.unwrap();
        let token = stored(&h, "a@x.com").await.verification_token.unwrap();

        h.accounts
            .resend_verification(ResendInput { email: "a@x.com".to_string() })
            .await
            .unwrap();

        // Same token both times
        let sent = h.mailer.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].html, sent[1].html);
        assert!(sent[1].html.contains(&token));

        h.accounts.verify(&token).await.unwrap();
        let err = h
            .accounts
            .resend_verification(ResendInput { email: "a@x.com".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::BadRequest(ref m) if m == ALREADY_VERIFIED));
    }

    #[tokio::test]
    async fn test_resend_verification_mail_failure() {
        let h = harness_with(RecordingMailer::failing()).await;
        h.accounts.register(register_input("a@x.com"), None).await.unwrap();

        let err = h
            .accounts
            .resend_verification(ResendInput { email: "a@x.com".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Mail(_)));
    }

    #[tokio::test]
    async fn test_set_subscription() {
        let h = harness().await;
        let user = register_verified(&h, "a@x.com").await;

        let summary = h.accounts.set_subscription(user.id, Subscription::Business).await.unwrap();
        assert_eq!(summary.subscription, Subscription::Business);
        assert_eq!(stored(&h, "a@x.com").await.subscription, Subscription::Business);

        let err = h.accounts.set_subscription(Uuid::new_v4(), Subscription::Pro).await.unwrap_err();
        assert!(matches!(err, AccountError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_avatar_replaces_local_file() {
        let h = harness().await;

        let staged = h.accounts.avatars().stage(Some("image/png"), png()).await.unwrap();
        h.accounts.register(register_input("a@x.com"), Some(staged)).await.unwrap();
        let user = stored(&h, "a@x.com").await;
        let old_path = h.accounts.avatars().local_path(&user.avatar_url).unwrap();
        assert!(old_path.exists());

        let staged = h.accounts.avatars().stage(Some("image/png"), png()).await.unwrap();
        let summary = h.accounts.update_avatar(&user, staged).await.unwrap();

        assert!(!old_path.exists());
        assert_ne!(summary.avatar_url, user.avatar_url);
        assert_eq!(stored(&h, "a@x.com").await.avatar_url, summary.avatar_url);
        assert!(h.accounts.avatars().local_path(&summary.avatar_url).unwrap().exists());
    }

    #[tokio::test]
    async fn test_update_avatar_from_fallback_keeps_remote_url_untouched() {
        let h = harness().await;
        let user = register_verified(&h, "a@x.com").await;
        assert!(!is_local_avatar(&user.avatar_url));

        let public_dir = h.accounts.avatars().public_dir().to_path_buf();
        let other = public_dir.join("someone-else.jpg");
        std::fs::write(&other, b"jpeg").unwrap();

        let staged = h.accounts.avatars().stage(Some("image/png"), png()).await.unwrap();
        let summary = h.accounts.update_avatar(&user, staged).await.unwrap();

        assert!(is_local_avatar(&summary.avatar_url));
        assert_eq!(stored(&h, "a@x.com").await.avatar_url, summary.avatar_url);

        // Nothing but the new avatar was added and nothing was deleted
        assert!(other.exists());
        assert_eq!(std::fs::read_dir(&public_dir).unwrap().count(), 2);
        assert!(!h.accounts.avatars().remove(&user.avatar_url).await);
    }
}
