//! Integration test support for the Orchard storefront.
//!
//! The suite runs against fully in-memory state: carts, stock, and the
//! catalog live in the in-process KV store, orders and reconciliation
//! records in their memory variants. No external service is needed, which
//! keeps the tests deterministic and runnable anywhere.
//!
//! Tests that require live Stripe or Postgres credentials do not belong
//! here; the saga is exercised through [`finalize_completed_session`] with
//! fixture session details instead, which is everything after the network
//! boundary.
//!
//! [`finalize_completed_session`]: orchard_storefront::services::finalize::finalize_completed_session

use std::net::{IpAddr, Ipv4Addr};

use orchard_core::ProductId;
use orchard_storefront::catalog::CatalogReader;
use orchard_storefront::config::{StorefrontConfig, StripeConfig};
use orchard_storefront::services::stripe::{
    SHIPPING_LINE_DESCRIPTION, SessionDetail, SessionLineItem, TAX_LINE_DESCRIPTION,
};
use orchard_storefront::state::AppState;
use rust_decimal::Decimal;
use secrecy::SecretString;

/// Configuration with test credentials and every external backend disabled.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: "https://shop.example".to_owned(),
        database_url: None,
        kv: None,
        stripe: StripeConfig {
            secret_key: SecretString::from("sk_test_123".to_owned()),
            webhook_secret: SecretString::from("whsec_test_secret".to_owned()),
        },
        admin_key: SecretString::from("test-admin-key".to_owned()),
        shipping_amount: Decimal::ZERO,
        default_stock: 100,
        smtp: None,
        sentry_dsn: None,
    }
}

/// Fully in-memory application state.
///
/// # Panics
///
/// Never in practice: state construction can only fail on SMTP setup, and
/// the test configuration has no SMTP.
#[must_use]
pub fn test_state() -> AppState {
    AppState::new(test_config(), None).expect("in-memory state has nothing to fail")
}

/// Set every default catalog product's stock counter to `stock`.
///
/// # Panics
///
/// Panics if a KV write fails, which the in-memory backend never does.
pub async fn seed_stock(state: &AppState, stock: i64) {
    for product in CatalogReader::default_products() {
        state
            .ledger()
            .set_stock(&product.id, stock)
            .await
            .expect("in-memory stock write");
    }
}

/// A product line as Stripe would report it on a completed session.
#[must_use]
pub fn product_line(
    description: &str,
    quantity: u32,
    amount_total_cents: i64,
    product_id: Option<&str>,
) -> SessionLineItem {
    SessionLineItem {
        description: description.to_owned(),
        quantity,
        amount_total: amount_total_cents,
        product_id: product_id.map(ProductId::new),
    }
}

/// The synthetic tax line checkout appends to the session.
#[must_use]
pub fn tax_line(amount_cents: i64) -> SessionLineItem {
    product_line(TAX_LINE_DESCRIPTION, 1, amount_cents, None)
}

/// The synthetic shipping line checkout appends to the session.
#[must_use]
pub fn shipping_line(amount_cents: i64) -> SessionLineItem {
    product_line(SHIPPING_LINE_DESCRIPTION, 1, amount_cents, None)
}

/// A completed-session fixture; the grand total is the sum of the lines.
#[must_use]
pub fn completed_session(
    stripe_session_id: &str,
    customer_email: Option<&str>,
    line_items: Vec<SessionLineItem>,
) -> SessionDetail {
    let amount_total = line_items.iter().map(|line| line.amount_total).sum();
    SessionDetail {
        id: stripe_session_id.to_owned(),
        amount_total,
        customer_email: customer_email.map(str::to_owned),
        shipping_address: None,
        line_items,
    }
}
