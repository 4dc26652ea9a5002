//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL of the storefront (checkout redirects)
//! - `STRIPE_SECRET_KEY` - Stripe API secret key
//! - `STRIPE_WEBHOOK_SECRET` - Stripe webhook signing secret
//! - `ADMIN_KEY` - Shared key for the admin API (`x-admin-key` header)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `DATABASE_URL` - `PostgreSQL` connection string; orders are kept in
//!   memory when unset
//! - `KV_REST_API_URL` / `KV_REST_API_TOKEN` - KV REST backend; in-memory
//!   storage when unset
//! - `SHIPPING_AMOUNT` - Flat shipping charge in dollars (default: 0)
//! - `DEFAULT_STOCK` - Stock shown when the ledger is unreachable (default: 100)
//! - `SMTP_HOST` / `SMTP_PORT` / `SMTP_USERNAME` / `SMTP_PASSWORD` /
//!   `EMAIL_FROM` - transactional email; notifications are skipped when unset
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for checkout success/cancel redirects
    pub base_url: String,
    /// `PostgreSQL` connection URL; `None` selects the in-memory order store
    pub database_url: Option<SecretString>,
    /// KV REST backend credentials; `None` selects in-memory storage
    pub kv: Option<KvConfig>,
    /// Stripe API configuration
    pub stripe: StripeConfig,
    /// Shared admin API key
    pub admin_key: SecretString,
    /// Flat shipping charge in dollars
    pub shipping_amount: Decimal,
    /// Stock substituted on listings when the ledger is unreachable
    pub default_stock: i64,
    /// SMTP configuration; `None` disables transactional email
    pub smtp: Option<SmtpConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// KV REST backend credentials.
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Endpoint URL
    pub rest_url: String,
    /// Bearer token
    pub rest_token: SecretString,
}

/// Stripe API credentials.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// API secret key (`sk_...`)
    pub secret_key: SecretString,
    /// Webhook signing secret (`whsec_...`)
    pub webhook_secret: SecretString,
}

/// SMTP transport configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// From address on outgoing mail
    pub from_address: String,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env_or_default::<IpAddr>("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        let database_url = get_optional_env("DATABASE_URL").map(SecretString::from);
        let kv = KvConfig::from_env()?;
        let stripe = StripeConfig::from_env()?;
        let admin_key = get_required_secret("ADMIN_KEY")?;
        let shipping_amount = parse_env_or_default::<Decimal>("SHIPPING_AMOUNT", "0")?;
        let default_stock = parse_env_or_default::<i64>("DEFAULT_STOCK", "100")?;
        let smtp = SmtpConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            host,
            port,
            base_url,
            database_url,
            kv,
            stripe,
            admin_key,
            shipping_amount,
            default_stock,
            smtp,
            sentry_dsn,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl KvConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(rest_url) = get_optional_env("KV_REST_API_URL") else {
            return Ok(None);
        };
        let rest_token = get_required_secret("KV_REST_API_TOKEN")?;
        Ok(Some(Self {
            rest_url,
            rest_token,
        }))
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: get_required_secret("STRIPE_SECRET_KEY")?,
            webhook_secret: get_required_secret("STRIPE_WEBHOOK_SECRET")?,
        })
    }
}

impl SmtpConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };
        Ok(Some(Self {
            host,
            port: parse_env_or_default::<u16>("SMTP_PORT", "587")?,
            username: get_required_env("SMTP_USERNAME")?,
            password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("EMAIL_FROM")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable with a default, parsed into `T`.
fn parse_env_or_default<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
