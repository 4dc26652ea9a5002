//! Cart handlers.
//!
//! Stock checks here are advisory (they keep the UI honest); the binding
//! check happens at finalization. All mutations return the updated cart.

use axum::Json;
use axum::extract::{Query, State};
use orchard_core::{ProductId, SessionId};
use serde::{Deserialize, Serialize};

use crate::cart::Cart;
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub success: bool,
    pub cart: Cart,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowQuery {
    session_id: Option<SessionId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    session_id: SessionId,
    product_id: ProductId,
    quantity: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    session_id: SessionId,
    product_id: ProductId,
    quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRequest {
    session_id: SessionId,
    product_id: ProductId,
}

/// GET `/api/cart?sessionId=`.
pub async fn show(
    State(state): State<AppState>,
    Query(query): Query<ShowQuery>,
) -> Result<Json<Cart>> {
    let session_id = query
        .session_id
        .ok_or_else(|| AppError::Validation("Session ID is required".to_owned()))?;
    Ok(Json(state.carts().get_cart(&session_id).await))
}

/// POST `/api/cart`: merge-add a product.
pub async fn add(
    State(state): State<AppState>,
    Json(req): Json<AddRequest>,
) -> Result<Json<CartResponse>> {
    let quantity = req.quantity.unwrap_or(1);
    if quantity == 0 {
        return Err(AppError::Validation(
            "Quantity must be at least 1".to_owned(),
        ));
    }

    check_stock_covers(&state, &req.session_id, &req.product_id, quantity, true).await?;

    let cart = state
        .carts()
        .add_to_cart(&req.session_id, &req.product_id, quantity)
        .await?;
    Ok(Json(CartResponse {
        success: true,
        cart,
    }))
}

/// PUT `/api/cart`: set a line's quantity; zero or less removes it.
pub async fn update(
    State(state): State<AppState>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<CartResponse>> {
    if req.quantity > 0 {
        let requested = u32::try_from(req.quantity).unwrap_or(u32::MAX);
        check_stock_covers(&state, &req.session_id, &req.product_id, requested, false).await?;
    }

    let cart = state
        .carts()
        .update_item(&req.session_id, &req.product_id, req.quantity)
        .await?;
    Ok(Json(CartResponse {
        success: true,
        cart,
    }))
}

/// DELETE `/api/cart`: remove a product's line.
pub async fn remove(
    State(state): State<AppState>,
    Json(req): Json<RemoveRequest>,
) -> Result<Json<CartResponse>> {
    let cart = state
        .carts()
        .remove_item(&req.session_id, &req.product_id)
        .await?;
    Ok(Json(CartResponse {
        success: true,
        cart,
    }))
}

/// Advisory check that stock covers the requested quantity, counting the
/// existing cart line when `additive`. A ledger outage reads as zero stock
/// so the check fails closed.
async fn check_stock_covers(
    state: &AppState,
    session_id: &SessionId,
    product_id: &ProductId,
    quantity: u32,
    additive: bool,
) -> Result<()> {
    let stock = match state.ledger().get_stock(product_id).await {
        Ok(stock) => stock,
        Err(e) => {
            tracing::warn!(product_id = %product_id, error = %e, "stock read failed, treating as zero");
            0
        }
    };

    let mut required = i64::from(quantity);
    if additive {
        let cart = state.carts().get_cart(session_id).await;
        if let Some(existing) = cart.find(product_id) {
            required += i64::from(existing.quantity);
        }
    }

    if stock < required {
        return Err(AppError::InsufficientStock {
            product: product_id.to_string(),
        });
    }
    Ok(())
}
