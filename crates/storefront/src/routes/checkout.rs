//! Checkout handler.

use axum::Json;
use axum::extract::State;
use orchard_core::{Email, SessionId};
use serde::Deserialize;

use crate::checkout::{self, CheckoutRedirect};
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    session_id: SessionId,
    email: Option<String>,
    /// Two-letter shipping state for tax calculation.
    state: Option<String>,
}

/// POST `/api/checkout`: price the cart and create a payment session.
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutRedirect>> {
    let email = req
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .map(Email::parse)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let redirect =
        checkout::begin(&state, &req.session_id, email, req.state.as_deref()).await?;
    Ok(Json(redirect))
}
