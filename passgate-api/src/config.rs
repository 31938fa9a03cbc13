/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct. Components receive the parts they need
/// at construction; nothing reads the environment after startup.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 3000)
/// - `BASE_URL`: Public URL used in verification links (default: http://localhost:{API_PORT})
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: *)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `JWT_SECRET`: Secret key for JWT signing (required, at least 32 characters)
/// - `JWT_EXPIRY_HOURS`: Session lifetime (default: 24)
/// - `SMTP_HOST`: SMTP relay; when unset, emails are only logged
/// - `SMTP_PORT`: SMTP port (default: 465)
/// - `SMTP_USERNAME` / `SMTP_PASSWORD`: SMTP credentials
/// - `MAIL_FROM`: Sender address (default: SMTP_USERNAME, then no-reply@localhost)
/// - `AVATAR_TEMP_DIR`: Staging directory for uploads (default: tmp)
/// - `AVATAR_PUBLIC_DIR`: Directory served under /avatars (default: public/avatars)
/// - `RUST_LOG`: Log filter; `LOG_FORMAT=json` switches to JSON logs
///
/// # Example
///
/// ```no_run
/// use passgate_api::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}:{}", config.api.host, config.api.port);
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use passgate_shared::mail::SmtpSettings;
use serde::{Deserialize, Serialize};
use std::env;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Outgoing mail configuration
    pub mail: MailConfig,

    /// Avatar storage configuration
    pub avatars: AvatarConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Public base URL, without trailing slash
    pub base_url: String,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,

    /// Session token lifetime in hours
    pub expiry_hours: i64,
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// SMTP relay host; `None` selects the logging mailer
    pub smtp_host: Option<String>,

    pub smtp_port: u16,

    pub smtp_username: Option<String>,

    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,

    /// Sender address
    pub from: String,
}

/// Avatar storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarConfig {
    /// Where uploads are staged before processing
    pub temp_dir: String,

    /// Where processed avatars are stored and served from
    pub public_dir: String,
}

impl MailConfig {
    /// SMTP settings, if an SMTP host is configured
    pub fn smtp_settings(&self) -> Option<SmtpSettings> {
        self.smtp_host.as_ref().map(|host| SmtpSettings {
            host: host.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            from: self.from.clone(),
        })
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_host = var_or("API_HOST", "0.0.0.0");
        let api_port = var_or("API_PORT", "3000")
            .parse::<u16>()
            .context("API_PORT must be a valid port number")?;

        let base_url = lookup("BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", api_port))
            .trim_end_matches('/')
            .to_string();

        let cors_origins = var_or("CORS_ORIGINS", "*")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_connections = var_or("DATABASE_MAX_CONNECTIONS", "10")
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let expiry_hours = var_or("JWT_EXPIRY_HOURS", "24")
            .parse::<i64>()
            .context("JWT_EXPIRY_HOURS must be an integer")?;

        if expiry_hours <= 0 {
            anyhow::bail!("JWT_EXPIRY_HOURS must be positive");
        }

        let smtp_username = lookup("SMTP_USERNAME");
        let mail_from = lookup("MAIL_FROM")
            .or_else(|| smtp_username.clone())
            .unwrap_or_else(|| "no-reply@localhost".to_string());

        let smtp_port = var_or("SMTP_PORT", "465")
            .parse::<u16>()
            .context("SMTP_PORT must be a valid port number")?;

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                base_url,
                cors_origins,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                expiry_hours,
            },
            mail: MailConfig {
                smtp_host: lookup("SMTP_HOST").filter(|host| !host.is_empty()),
                smtp_port,
                smtp_username,
                smtp_password: lookup("SMTP_PASSWORD"),
                from: mail_from,
            },
            avatars: AvatarConfig {
                temp_dir: var_or("AVATAR_TEMP_DIR", "tmp"),
                public_dir: var_or("AVATAR_PUBLIC_DIR", "public/avatars"),
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
