//! Checkout orchestration.
//!
//! [`prepare`] turns a cart into a priced plan (resolved products, advisory
//! stock check, subtotal, tax, shipping) without touching the network.
//! [`begin`] takes the plan to the payment provider and hands back the
//! redirect URL. Nothing here decrements stock or creates orders; that
//! happens only after payment, in the finalization saga.

use orchard_core::{Email, SessionId};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::cart::Cart;
use crate::catalog::CatalogReader;
use crate::inventory::StockLedger;
use crate::kv::KvError;
use crate::services::stripe::{CheckoutSessionArgs, PaymentLine, StripeError};
use crate::state::AppState;
use crate::tax::{self, TaxCalculation};

/// Errors from checkout preparation and session creation.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("product {0} not found")]
    ProductNotFound(orchard_core::ProductId),

    #[error("not enough stock for {title}")]
    InsufficientStock {
        /// Title of the product that cannot be fulfilled.
        title: String,
    },

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Stripe(#[from] StripeError),
}

/// A priced, validated checkout.
#[derive(Debug, Clone)]
pub struct CheckoutPlan {
    pub lines: Vec<PaymentLine>,
    pub subtotal: Decimal,
    pub tax: TaxCalculation,
    pub shipping: Decimal,
}

impl CheckoutPlan {
    /// Grand total the shopper will be charged.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.subtotal + self.tax.amount + self.shipping
    }
}

/// Redirect handed back to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRedirect {
    /// Hosted payment page URL.
    pub url: String,
    /// Provider checkout session id.
    pub session_id: String,
}

/// Price and validate a cart for checkout.
///
/// The stock check here is advisory: it catches obviously unfulfillable
/// carts before the shopper reaches the payment page, but the binding check
/// is the atomic decrement after payment. A ledger outage reads as zero
/// stock, so checkout fails closed.
///
/// # Errors
///
/// Returns [`CheckoutError`] for an empty cart, an unknown product, or an
/// unfulfillable quantity.
pub async fn prepare(
    catalog: &CatalogReader,
    ledger: &StockLedger,
    cart: &Cart,
    region: &str,
    shipping_amount: Decimal,
) -> Result<CheckoutPlan, CheckoutError> {
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut lines = Vec::with_capacity(cart.items.len());
    let mut subtotal = Decimal::ZERO;
    for item in &cart.items {
        let product = catalog
            .get_by_id(&item.product_id)
            .await
            .ok_or_else(|| CheckoutError::ProductNotFound(item.product_id.clone()))?;

        let stock = match ledger.get_stock(&item.product_id).await {
            Ok(stock) => stock,
            Err(e) => {
                tracing::warn!(product_id = %item.product_id, error = %e, "stock read failed during checkout, treating as zero");
                0
            }
        };
        if stock < i64::from(item.quantity) {
            return Err(CheckoutError::InsufficientStock {
                title: product.title,
            });
        }

        subtotal += product.price * Decimal::from(item.quantity);
        lines.push(PaymentLine {
            product_id: product.id,
            title: product.title,
            image: product.images.first().cloned(),
            unit_amount: product.price,
            quantity: item.quantity,
        });
    }

    Ok(CheckoutPlan {
        lines,
        subtotal,
        tax: tax::calculate_tax(subtotal, region),
        shipping: shipping_amount,
    })
}

/// Run a full checkout: price the cart, remember the contact email, create
/// the provider session, and return the redirect.
///
/// # Errors
///
/// Returns [`CheckoutError`] from preparation or the provider call.
pub async fn begin(
    state: &AppState,
    session_id: &SessionId,
    email: Option<Email>,
    region: Option<&str>,
) -> Result<CheckoutRedirect, CheckoutError> {
    let cart = state.carts().get_cart(session_id).await;
    let plan = prepare(
        state.catalog(),
        state.ledger(),
        &cart,
        region.unwrap_or(""),
        state.config().shipping_amount,
    )
    .await?;

    if let Some(email) = &email {
        // Best effort: losing the email only weakens cart recovery.
        if let Err(e) = state.carts().set_email(session_id, email).await {
            tracing::warn!(session_id = %session_id, error = %e, "failed to save cart email");
        }
    }

    let base_url = &state.config().base_url;
    let args = CheckoutSessionArgs {
        cart_session_id: session_id.clone(),
        customer_email: email.map(Email::into_inner),
        lines: plan.lines.clone(),
        tax_amount: plan.tax.amount,
        shipping_amount: plan.shipping,
        success_url: format!("{base_url}/success?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel_url: format!("{base_url}/cart"),
    };
    let session = state.stripe().create_checkout_session(&args).await?;

    tracing::info!(
        session_id = %session_id,
        stripe_session_id = %session.id,
        total = %plan.total(),
        "checkout session created"
    );
    Ok(CheckoutRedirect {
        url: session.url,
        session_id: session.id,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use orchard_core::ProductId;

    use super::*;
    use crate::cart::{CartItem, CartStore};
    use crate::kv::KvClient;

    async fn fixtures() -> (CatalogReader, StockLedger, CartStore) {
        let kv = KvClient::in_memory();
        let catalog = CatalogReader::new(kv.clone());
        let ledger = StockLedger::new(kv.clone());
        for product in CatalogReader::default_products() {
            ledger.set_stock(&product.id, 50).await.unwrap();
        }
        (catalog, ledger, CartStore::new(kv))
    }

    fn cart_with(items: Vec<(&str, u32)>) -> Cart {
        Cart {
            items: items
                .into_iter()
                .map(|(id, quantity)| CartItem {
                    product_id: ProductId::new(id),
                    quantity,
                    added_at: 0,
                })
                .collect(),
            email: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn test_prepare_totals_for_california() {
        let (catalog, ledger, _) = fixtures().await;
        // Earbuds ($79.99 x 1) + watch ($149.99 x 1) = $159.98.
        let cart = cart_with(vec![("prod_001", 1), ("prod_002", 1)]);

        let plan = prepare(&catalog, &ledger, &cart, "CA", Decimal::ZERO)
            .await
            .unwrap();
        assert_eq!(plan.subtotal, Decimal::new(15_998, 2));
        assert_eq!(plan.tax.amount, Decimal::new(1160, 2));
        assert_eq!(plan.total(), Decimal::new(17_158, 2));
        assert_eq!(plan.lines.len(), 2);
    }

    #[tokio::test]
    async fn test_prepare_quantity_multiplies() {
        let (catalog, ledger, _) = fixtures().await;
        let cart = cart_with(vec![("prod_001", 3)]);

        let plan = prepare(&catalog, &ledger, &cart, "OR", Decimal::new(599, 2))
            .await
            .unwrap();
        assert_eq!(plan.subtotal, Decimal::new(23_997, 2));
        assert_eq!(plan.tax.amount, Decimal::ZERO);
        assert_eq!(plan.shipping, Decimal::new(599, 2));
        assert_eq!(plan.total(), Decimal::new(24_596, 2));
    }

    #[tokio::test]
    async fn test_prepare_rejects_empty_cart() {
        let (catalog, ledger, _) = fixtures().await;
        let err = prepare(&catalog, &ledger, &cart_with(vec![]), "CA", Decimal::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));
    }

    #[tokio::test]
    async fn test_prepare_rejects_unknown_product() {
        let (catalog, ledger, _) = fixtures().await;
        let cart = cart_with(vec![("prod_404", 1)]);
        let err = prepare(&catalog, &ledger, &cart, "CA", Decimal::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ProductNotFound(id) if id.as_str() == "prod_404"));
    }

    #[tokio::test]
    async fn test_prepare_rejects_oversell() {
        let (catalog, ledger, _) = fixtures().await;
        ledger
            .set_stock(&ProductId::new("prod_001"), 2)
            .await
            .unwrap();
        let cart = cart_with(vec![("prod_001", 3)]);

        let err = prepare(&catalog, &ledger, &cart, "CA", Decimal::ZERO)
            .await
            .unwrap_err();
        assert!(
            matches!(err, CheckoutError::InsufficientStock { title } if title == "Wireless Earbuds Pro")
        );
    }

    #[tokio::test]
    async fn test_prepare_does_not_consume_stock() {
        let (catalog, ledger, _) = fixtures().await;
        let cart = cart_with(vec![("prod_001", 5)]);
        prepare(&catalog, &ledger, &cart, "CA", Decimal::ZERO)
            .await
            .unwrap();
        assert_eq!(
            ledger.get_stock(&ProductId::new("prod_001")).await.unwrap(),
            50
        );
    }
}
