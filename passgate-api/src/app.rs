/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use passgate_api::{app::AppState, config::Config};
/// use passgate_shared::accounts::{AccountService, AccountSettings};
/// use passgate_shared::avatar::AvatarStorage;
/// use passgate_shared::mail::LogMailer;
/// use passgate_shared::store::InMemoryUserStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let accounts = AccountService::new(
///     Arc::new(InMemoryUserStore::new()),
///     Arc::new(LogMailer),
///     AvatarStorage::new(&config.avatars.temp_dir, &config.avatars.public_dir),
///     AccountSettings::new(&config.api.base_url, &config.jwt.secret),
/// );
/// let state = AppState::new(accounts, config);
/// let app = passgate_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, patch, post},
    Router,
};
use passgate_shared::{accounts::AccountService, avatar::MAX_AVATAR_BYTES};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Room for the non-file multipart fields on top of the largest avatar
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Account flows and their collaborators
    pub accounts: Arc<AccountService>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(accounts: AccountService, config: Config) -> Self {
        Self {
            accounts: Arc::new(accounts),
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                   # Health check (public)
/// ├── /avatars/*                # Stored avatar images (public)
/// └── /api/auth/
///     ├── POST  /register       # multipart: email, password, subscription?, avatar?
///     ├── GET   /verify/:token
///     ├── POST  /verify         # resend verification email
///     ├── POST  /login
///     ├── POST  /logout         # authenticated
///     ├── GET   /current        # authenticated
///     ├── PATCH /subscription   # authenticated
///     └── PATCH /avatars        # authenticated, multipart: avatar
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Body limit sized for avatar uploads
/// 4. Authentication (protected routes only)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Session routes (require a current session token)
    let protected_routes = Router::new()
        .route("/logout", post(routes::auth::logout))
        .route("/current", get(routes::auth::current))
        .route("/subscription", patch(routes::auth::set_subscription))
        .route("/avatars", patch(routes::auth::update_avatar))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), session_auth_layer));

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/verify/:token", get(routes::auth::verify))
        .route("/verify", post(routes::auth::resend_verification))
        .route("/login", post(routes::auth::login))
        .merge(protected_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|origin| origin == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        // Production mode: configure allowed origins
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    let avatar_files = ServeDir::new(state.accounts.avatars().public_dir());

    Router::new()
        .merge(health_routes)
        .nest("/api/auth", auth_routes)
        .nest_service("/avatars", avatar_files)
        .layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES + FORM_OVERHEAD_BYTES))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

/// Session authentication middleware layer
///
/// Resolves the bearer token to its user, then injects an `AuthContext`
/// into request extensions for the `AuthContext` extractor.
async fn session_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let auth_context = state.accounts.authenticate(auth_header).await?;

    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}
