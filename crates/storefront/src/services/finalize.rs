//! Order finalization saga.
//!
//! Driven by payment-provider webhooks. Once payment is captured the saga
//! runs forward only: the order is created first (idempotently, keyed on the
//! provider session id), and every later step failure is absorbed rather
//! than propagated. A stock decrement that cannot happen becomes a
//! reconciliation record; a cart clear or email failure is logged. A paid
//! order is never lost to a partial failure, and a redelivered webhook stops
//! at the duplicate order without repeating side effects.

use orchard_core::{OrderId, OrderStatus, ProductId, SessionId, cents_to_decimal};
use rust_decimal::Decimal;

use crate::db::orders::{NewOrder, OrderItem};
use crate::error::AppError;
use crate::inventory::StockError;
use crate::services::stripe::{
    SHIPPING_LINE_DESCRIPTION, SessionDetail, TAX_LINE_DESCRIPTION,
};
use crate::state::AppState;

/// Verify and dispatch a webhook delivery.
///
/// Only `checkout.session.completed` triggers work; every other event type
/// is acknowledged with a log. A completed session without our
/// `cart_session_id` metadata cannot be correlated and is acknowledged too.
///
/// # Errors
///
/// Returns [`AppError::InvalidSignature`] for an unverifiable payload and
/// [`AppError::Upstream`] when the session detail fetch fails; both make the
/// provider retry.
pub async fn handle_webhook(
    state: &AppState,
    payload: &[u8],
    signature_header: &str,
) -> Result<(), AppError> {
    let event = state.stripe().verify_webhook(payload, signature_header)?;

    if event.event_type != "checkout.session.completed" {
        tracing::info!(event_type = %event.event_type, "ignoring webhook event");
        return Ok(());
    }

    let Some(cart_session) = event.metadata.get("cart_session_id") else {
        tracing::warn!(
            stripe_session_id = %event.object_id,
            "completed session has no cart_session_id metadata, cannot finalize"
        );
        return Ok(());
    };
    let cart_session = SessionId::new(cart_session.clone());

    let detail = state.stripe().get_session_detail(&event.object_id).await?;
    finalize_completed_session(state, &cart_session, &detail).await?;
    Ok(())
}

/// Finalize a paid checkout session: create the order, decrement stock,
/// clear the cart, send the confirmation.
///
/// Returns the new order id, or `None` when the session was already
/// finalized (redelivery), in which case nothing else runs.
///
/// # Errors
///
/// Returns [`AppError`] only when order creation itself fails; everything
/// after the order exists is absorbed.
pub async fn finalize_completed_session(
    state: &AppState,
    cart_session: &SessionId,
    detail: &SessionDetail,
) -> Result<Option<OrderId>, AppError> {
    let (items, subtotal, tax, shipping) = split_line_items(state, detail).await;

    let outcome = state
        .orders()
        .create(NewOrder {
            session_id: cart_session.clone(),
            customer_email: detail.customer_email.clone().unwrap_or_default(),
            stripe_session_id: detail.id.clone(),
            status: OrderStatus::Paid,
            subtotal,
            tax,
            shipping,
            total: cents_to_decimal(detail.amount_total),
            shipping_address: detail.shipping_address.clone(),
            items: items.clone(),
        })
        .await?;

    if !outcome.created {
        tracing::info!(
            stripe_session_id = %detail.id,
            order_id = %outcome.order_id,
            "session already finalized, skipping side effects"
        );
        return Ok(None);
    }
    tracing::info!(
        stripe_session_id = %detail.id,
        order_id = %outcome.order_id,
        "order created"
    );

    for item in &items {
        if item.product_id.as_str().is_empty() {
            tracing::warn!(
                stripe_session_id = %detail.id,
                title = %item.product_title,
                "line item has no product id, stock not decremented"
            );
            record_discrepancy(state, &detail.id, item, "unresolved product id").await;
            continue;
        }
        match state.ledger().decrement(&item.product_id, item.quantity).await {
            Ok(remaining) => {
                tracing::info!(product_id = %item.product_id, remaining, "stock decremented");
            }
            Err(StockError::Insufficient { .. }) => {
                tracing::error!(
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    "paid order exceeds stock, flagging for reconciliation"
                );
                record_discrepancy(state, &detail.id, item, "insufficient stock").await;
            }
            Err(StockError::Kv(e)) => {
                tracing::error!(
                    product_id = %item.product_id,
                    error = %e,
                    "stock backend unavailable, flagging for reconciliation"
                );
                record_discrepancy(state, &detail.id, item, "stock backend unavailable").await;
            }
        }
    }

    if let Err(e) = state.carts().clear(cart_session).await {
        tracing::warn!(session_id = %cart_session, error = %e, "failed to clear cart after order");
    }

    if let Some(mailer) = state.mailer() {
        match state.orders().get_by_id(outcome.order_id).await {
            Ok(Some(order)) if !order.customer_email.is_empty() => {
                if let Err(e) = mailer.send_order_confirmation(&order).await {
                    tracing::warn!(order_id = %order.id, error = %e, "failed to send order confirmation");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(order_id = %outcome.order_id, error = %e, "failed to load order for confirmation email");
            }
        }
    }

    Ok(Some(outcome.order_id))
}

/// Split provider line items into order items and amounts. The synthetic tax
/// and shipping lines become the tax/shipping amounts; everything else is a
/// product line. Product ids come from line metadata, with a catalog title
/// lookup as fallback.
async fn split_line_items(
    state: &AppState,
    detail: &SessionDetail,
) -> (Vec<OrderItem>, Decimal, Decimal, Decimal) {
    let mut items = Vec::new();
    let mut subtotal = Decimal::ZERO;
    let mut tax = Decimal::ZERO;
    let mut shipping = Decimal::ZERO;

    for line in &detail.line_items {
        match line.description.as_str() {
            TAX_LINE_DESCRIPTION => {
                tax += cents_to_decimal(line.amount_total);
                continue;
            }
            SHIPPING_LINE_DESCRIPTION => {
                shipping += cents_to_decimal(line.amount_total);
                continue;
            }
            _ => {}
        }

        let product_id = match &line.product_id {
            Some(id) => id.clone(),
            None => match state.catalog().get_products().await.iter().find(|p| p.title == line.description) {
                Some(product) => {
                    tracing::warn!(
                        title = %line.description,
                        product_id = %product.id,
                        "line item missing product metadata, matched by title"
                    );
                    product.id.clone()
                }
                None => ProductId::new(""),
            },
        };

        let quantity = line.quantity.max(1);
        subtotal += cents_to_decimal(line.amount_total);
        items.push(OrderItem {
            product_id,
            product_title: line.description.clone(),
            quantity,
            unit_price: cents_to_decimal(line.amount_total / i64::from(quantity)),
        });
    }

    (items, subtotal, tax, shipping)
}

async fn record_discrepancy(state: &AppState, stripe_session_id: &str, item: &OrderItem, reason: &str) {
    if let Err(e) = state
        .reconciliation()
        .record(stripe_session_id, &item.product_id, item.quantity, reason)
        .await
    {
        tracing::error!(
            stripe_session_id = %stripe_session_id,
            product_id = %item.product_id,
            error = %e,
            "failed to record stock reconciliation entry"
        );
    }
}
