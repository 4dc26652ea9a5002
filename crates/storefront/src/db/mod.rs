//! Database operations for storefront `PostgreSQL`.
//!
//! # Tables
//!
//! - `orders` - One row per paid checkout session, unique on the Stripe
//!   session id
//! - `order_items` - Child line items
//! - `stock_reconciliation` - Post-payment stock decrement failures awaiting
//!   manual review
//!
//! The database is optional: without `DATABASE_URL` the stores fall back to
//! in-memory variants (local development, tests).
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p orchard-cli -- migrate
//! ```

pub mod orders;
pub mod reconciliation;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
