//! Payment provider webhook handler.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::services::finalize;
use crate::state::AppState;

/// POST `/api/webhook/stripe`: verify and process a webhook delivery.
///
/// The raw body is required for signature verification; parsing happens only
/// after the signature checks out.
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing Stripe signature".to_owned()))?;
    if body.is_empty() {
        return Err(AppError::Validation("Missing request body".to_owned()));
    }

    finalize::handle_webhook(&state, &body, signature).await?;
    Ok(Json(json!({ "received": true })))
}
