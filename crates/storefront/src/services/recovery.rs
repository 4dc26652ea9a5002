//! Abandoned-cart recovery.
//!
//! Sweeps stale carts that have a contact email and sends a reminder.
//! Triggered from the admin API (an external scheduler calls it); there is
//! no built-in timer.

use rust_decimal::Decimal;

use crate::error::AppError;
use crate::services::email::ReminderItem;
use crate::state::AppState;

/// Send reminder emails for carts untouched for `older_than_hours` hours.
/// Returns the number of reminders sent.
///
/// # Errors
///
/// Returns [`AppError::Validation`] when email is not configured and
/// [`AppError::Upstream`] when the cart scan fails. Individual send failures
/// are logged and skipped.
pub async fn send_reminders(state: &AppState, older_than_hours: u64) -> Result<usize, AppError> {
    let Some(mailer) = state.mailer() else {
        return Err(AppError::Validation(
            "Email delivery is not configured".to_owned(),
        ));
    };

    let sessions = state.carts().abandoned_sessions(older_than_hours).await?;
    tracing::info!(count = sessions.len(), older_than_hours, "abandoned cart sweep");

    let mut sent = 0;
    for session_id in sessions {
        let cart = state.carts().get_cart(&session_id).await;
        let Some(email) = cart.email.clone() else {
            continue;
        };

        let mut items = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            // Products can leave the catalog while a cart is dormant.
            let Some(product) = state.catalog().get_by_id(&line.product_id).await else {
                continue;
            };
            items.push(ReminderItem {
                title: product.title,
                quantity: line.quantity,
                line_total: product.price * Decimal::from(line.quantity),
            });
        }
        if items.is_empty() {
            continue;
        }

        match mailer.send_abandoned_cart(&email, &items).await {
            Ok(()) => sent += 1,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "failed to send cart reminder");
            }
        }
    }
    Ok(sent)
}
