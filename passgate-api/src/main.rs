//! # Passgate API Server
//!
//! HTTP server for user accounts: registration with email verification,
//! password login with revocable session tokens, subscription tiers and
//! avatars.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p passgate-api
//! ```

use anyhow::Context;
use passgate_api::{
    app::{build_router, AppState},
    config::Config,
};
use passgate_shared::{
    accounts::{AccountService, AccountSettings},
    avatar::AvatarStorage,
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool, DatabaseConfig},
    },
    mail::{LogMailer, Mailer, SmtpMailer},
    store::PgUserStore,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "passgate_api=debug,passgate_shared=debug,tower_http=debug".into()
    });

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is loaded before tracing so RUST_LOG and LOG_FORMAT apply
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Passgate API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await
    .context("Failed to connect to database")?;

    run_migrations(&pool).await.context("Failed to run migrations")?;

    let mailer: Arc<dyn Mailer> = match config.mail.smtp_settings() {
        Some(settings) => {
            tracing::info!(host = %settings.host, port = settings.port, "Using SMTP mailer");
            Arc::new(SmtpMailer::new(settings)?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, verification emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let avatars = AvatarStorage::new(&config.avatars.temp_dir, &config.avatars.public_dir);
    avatars
        .ensure_dirs()
        .await
        .context("Failed to create avatar directories")?;

    let settings = AccountSettings::new(&config.api.base_url, &config.jwt.secret)
        .with_token_ttl(chrono::Duration::hours(config.jwt.expiry_hours));

    let accounts = AccountService::new(
        Arc::new(PgUserStore::new(pool.clone())),
        mailer,
        avatars,
        settings,
    );

    let bind_address = config.bind_address();
    let app = build_router(AppState::new(accounts, config));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown signal received, closing database pool...");
    close_pool(pool).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
