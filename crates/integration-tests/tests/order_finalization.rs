//! Webhook-driven order finalization against in-memory state.
//!
//! Exercises the saga from a verified, completed payment session onward:
//! idempotent order creation, atomic stock decrements, cart teardown, and
//! the reconciliation records written when stock cannot move.

#![allow(clippy::unwrap_used)]

use orchard_core::{OrderStatus, ProductId, SessionId};
use orchard_integration_tests::{
    completed_session, product_line, seed_stock, shipping_line, tax_line, test_state,
};
use orchard_storefront::services::finalize::finalize_completed_session;
use rust_decimal::Decimal;

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_paid_session_becomes_order() {
    let state = test_state();
    seed_stock(&state, 10).await;
    let session = SessionId::new("sess_pay_1");
    let earbuds = ProductId::new("prod_001");

    state.carts().add_to_cart(&session, &earbuds, 2).await.unwrap();
    let detail = completed_session(
        "cs_int_1",
        Some("shopper@example.com"),
        vec![
            product_line("Wireless Earbuds Pro", 2, 15_998, Some("prod_001")),
            tax_line(1160),
        ],
    );

    let order_id = finalize_completed_session(&state, &session, &detail)
        .await
        .unwrap()
        .unwrap();

    let order = state.orders().get_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.customer_email, "shopper@example.com");
    assert_eq!(order.stripe_session_id, "cs_int_1");
    assert_eq!(order.subtotal, Decimal::new(15_998, 2));
    assert_eq!(order.tax, Decimal::new(1160, 2));
    assert_eq!(order.shipping, Decimal::ZERO);
    assert_eq!(order.total, Decimal::new(17_158, 2));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].product_id, earbuds);
    assert_eq!(order.items[0].quantity, 2);
    assert_eq!(order.items[0].unit_price, Decimal::new(7999, 2));

    // Payment consumed the stock and the cart.
    assert_eq!(state.ledger().get_stock(&earbuds).await.unwrap(), 8);
    assert!(state.carts().get_cart(&session).await.is_empty());
    assert!(state.reconciliation().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_synthetic_lines_become_amounts_not_items() {
    let state = test_state();
    seed_stock(&state, 10).await;
    let session = SessionId::new("sess_pay_2");

    let detail = completed_session(
        "cs_int_2",
        Some("shopper@example.com"),
        vec![
            product_line("Smart Fitness Watch", 1, 14_999, Some("prod_002")),
            tax_line(937),
            shipping_line(599),
        ],
    );
    let order_id = finalize_completed_session(&state, &session, &detail)
        .await
        .unwrap()
        .unwrap();

    let order = state.orders().get_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.subtotal, Decimal::new(14_999, 2));
    assert_eq!(order.tax, Decimal::new(937, 2));
    assert_eq!(order.shipping, Decimal::new(599, 2));
    assert_eq!(order.total, Decimal::new(16_535, 2));
}

// =============================================================================
// Redelivery
// =============================================================================

#[tokio::test]
async fn test_redelivered_session_finalizes_once() {
    let state = test_state();
    seed_stock(&state, 10).await;
    let session = SessionId::new("sess_redeliver");
    let earbuds = ProductId::new("prod_001");

    let detail = completed_session(
        "cs_int_dup",
        Some("shopper@example.com"),
        vec![product_line("Wireless Earbuds Pro", 2, 15_998, Some("prod_001"))],
    );

    let first = finalize_completed_session(&state, &session, &detail)
        .await
        .unwrap();
    let second = finalize_completed_session(&state, &session, &detail)
        .await
        .unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
    // Side effects ran exactly once.
    assert_eq!(state.ledger().get_stock(&earbuds).await.unwrap(), 8);
    let order = state
        .orders()
        .get_by_stripe_session("cs_int_dup")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.id, first.unwrap());
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_oversold_session_is_flagged_not_failed() {
    let state = test_state();
    seed_stock(&state, 1).await;
    let session = SessionId::new("sess_oversold");
    let earbuds = ProductId::new("prod_001");

    let detail = completed_session(
        "cs_int_over",
        Some("shopper@example.com"),
        vec![product_line("Wireless Earbuds Pro", 2, 15_998, Some("prod_001"))],
    );
    let order_id = finalize_completed_session(&state, &session, &detail)
        .await
        .unwrap();

    // The paid order exists regardless of the stock shortfall.
    assert!(order_id.is_some());
    // The failed decrement was compensated and recorded.
    assert_eq!(state.ledger().get_stock(&earbuds).await.unwrap(), 1);
    let entries = state.reconciliation().list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].stripe_session_id, "cs_int_over");
    assert_eq!(entries[0].product_id, earbuds);
    assert_eq!(entries[0].quantity, 2);
    assert_eq!(entries[0].reason, "insufficient stock");
}

#[tokio::test]
async fn test_unresolved_product_is_flagged() {
    let state = test_state();
    seed_stock(&state, 10).await;
    let session = SessionId::new("sess_mystery");

    // Not in the catalog and no metadata: the id cannot be recovered.
    let detail = completed_session(
        "cs_int_mystery",
        Some("shopper@example.com"),
        vec![product_line("Mystery Box", 1, 4999, None)],
    );
    let order_id = finalize_completed_session(&state, &session, &detail)
        .await
        .unwrap()
        .unwrap();

    let order = state.orders().get_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.items.len(), 1);
    assert!(order.items[0].product_id.as_str().is_empty());

    let entries = state.reconciliation().list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, "unresolved product id");
}

#[tokio::test]
async fn test_missing_metadata_falls_back_to_catalog_title() {
    let state = test_state();
    seed_stock(&state, 10).await;
    let session = SessionId::new("sess_fallback");
    let watch = ProductId::new("prod_002");

    let detail = completed_session(
        "cs_int_title",
        Some("shopper@example.com"),
        vec![product_line("Smart Fitness Watch", 1, 14_999, None)],
    );
    let order_id = finalize_completed_session(&state, &session, &detail)
        .await
        .unwrap()
        .unwrap();

    // Matched by title, so stock still moves and nothing is flagged.
    let order = state.orders().get_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.items[0].product_id, watch);
    assert_eq!(state.ledger().get_stock(&watch).await.unwrap(), 9);
    assert!(state.reconciliation().list().await.unwrap().is_empty());
}

// =============================================================================
// Guest sessions
// =============================================================================

#[tokio::test]
async fn test_session_without_email_still_finalizes() {
    let state = test_state();
    seed_stock(&state, 10).await;
    let session = SessionId::new("sess_guest");

    let detail = completed_session(
        "cs_int_guest",
        None,
        vec![product_line("Wireless Earbuds Pro", 1, 7999, Some("prod_001"))],
    );
    let order_id = finalize_completed_session(&state, &session, &detail)
        .await
        .unwrap()
        .unwrap();

    let order = state.orders().get_by_id(order_id).await.unwrap().unwrap();
    assert!(order.customer_email.is_empty());
    assert_eq!(order.total, Decimal::new(7999, 2));
}
