//! Admin handlers, authenticated by the `x-admin-key` header.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use orchard_core::ProductId;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::db::reconciliation::ReconciliationEntry;
use crate::error::{AppError, Result};
use crate::services::recovery;
use crate::services::stripe::constant_time_compare;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryQuery {
    product_id: Option<ProductId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInventoryRequest {
    product_id: ProductId,
    quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockEntry {
    product_id: ProductId,
    stock: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbandonedCartsRequest {
    older_than_hours: Option<u64>,
}

/// GET `/api/admin/inventory?productId=`: one counter, or every catalog
/// product's counter.
pub async fn get_inventory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<InventoryQuery>,
) -> Result<Json<Vec<StockEntry>>> {
    require_admin(&state, &headers)?;

    if let Some(product_id) = query.product_id {
        let stock = state.ledger().get_stock(&product_id).await?;
        return Ok(Json(vec![StockEntry { product_id, stock }]));
    }

    let ids: Vec<ProductId> = state
        .catalog()
        .get_products()
        .await
        .iter()
        .map(|p| p.id.clone())
        .collect();
    let stocks = state.ledger().get_many(&ids).await?;
    Ok(Json(
        ids.into_iter()
            .map(|product_id| {
                let stock = stocks.get(&product_id).copied().unwrap_or(0);
                StockEntry { product_id, stock }
            })
            .collect(),
    ))
}

/// POST `/api/admin/inventory`: set a counter to an absolute value.
pub async fn set_inventory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SetInventoryRequest>,
) -> Result<Json<Value>> {
    require_admin(&state, &headers)?;
    if req.quantity < 0 {
        return Err(AppError::Validation(
            "Quantity must not be negative".to_owned(),
        ));
    }

    state.ledger().set_stock(&req.product_id, req.quantity).await?;
    let stock = state.ledger().get_stock(&req.product_id).await?;
    tracing::info!(product_id = %req.product_id, stock, "stock set by admin");
    Ok(Json(json!({
        "success": true,
        "productId": req.product_id,
        "stock": stock,
    })))
}

/// GET `/api/admin/reconciliation`: unresolved stock discrepancies.
pub async fn reconciliation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ReconciliationEntry>>> {
    require_admin(&state, &headers)?;
    let entries = state
        .reconciliation()
        .list()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(entries))
}

/// POST `/api/admin/abandoned-carts`: sweep stale carts and send reminders.
pub async fn abandoned_carts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AbandonedCartsRequest>,
) -> Result<Json<Value>> {
    require_admin(&state, &headers)?;
    let sent = recovery::send_reminders(&state, req.older_than_hours.unwrap_or(24)).await?;
    Ok(Json(json!({ "success": true, "sent": sent })))
}

/// Check the `x-admin-key` header against the configured key. The response
/// is a generic 401 whether the header is missing or wrong.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let provided = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let expected = state.config().admin_key.expose_secret();
    if provided.is_empty() || !constant_time_compare(provided, expected) {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
