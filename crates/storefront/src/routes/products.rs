//! Product listing and detail handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// A product with live stock merged in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductWithStock {
    #[serde(flatten)]
    pub product: Product,
    pub stock: i64,
    pub in_stock: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    category: Option<String>,
    featured: Option<String>,
    sort: Option<String>,
    limit: Option<usize>,
}

/// GET `/api/products` with optional `category`, `featured`, `sort`
/// (`price-asc`, `price-desc`, `rating`), and `limit` filters.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ProductWithStock>>> {
    let mut products: Vec<Product> = state.catalog().get_products().await.as_ref().clone();

    if let Some(category) = &query.category {
        products.retain(|p| &p.category == category);
    }
    if query.featured.as_deref() == Some("true") {
        products.retain(|p| p.featured);
    }
    match query.sort.as_deref() {
        Some("price-asc") => products.sort_by(|a, b| a.price.cmp(&b.price)),
        Some("price-desc") => products.sort_by(|a, b| b.price.cmp(&a.price)),
        Some("rating") => products.sort_by(|a, b| b.rating.total_cmp(&a.rating)),
        _ => {}
    }
    if let Some(limit) = query.limit {
        products.truncate(limit);
    }

    let ids: Vec<_> = products.iter().map(|p| p.id.clone()).collect();
    let stocks = match state.ledger().get_many(&ids).await {
        Ok(stocks) => stocks,
        Err(e) => {
            // Listing stays up with the configured default when the ledger
            // is unreachable.
            tracing::warn!(error = %e, "stock lookup failed, substituting default stock");
            ids.iter()
                .map(|id| (id.clone(), state.config().default_stock))
                .collect()
        }
    };

    Ok(Json(
        products
            .into_iter()
            .map(|product| {
                let stock = stocks.get(&product.id).copied().unwrap_or(0);
                ProductWithStock {
                    product,
                    stock,
                    in_stock: stock > 0,
                }
            })
            .collect(),
    ))
}

/// GET `/api/products/{*slug}`. The wildcard keeps slashes in slugs intact;
/// resolution tries raw, decoded, and normalized forms.
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    if slug.trim().is_empty() {
        return Err(AppError::Validation("Product slug is required".to_owned()));
    }

    let product = state
        .catalog()
        .get_by_slug(&slug)
        .await
        .ok_or_else(|| AppError::NotFound(format!("product {slug}")))?;

    let stock = match state.ledger().get_stock(&product.id).await {
        Ok(stock) => stock,
        Err(e) => {
            tracing::warn!(product_id = %product.id, error = %e, "stock lookup failed, substituting default stock");
            state.config().default_stock
        }
    };

    // Stock changes quickly; keep intermediaries from caching it.
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(ProductWithStock {
            product,
            stock,
            in_stock: stock > 0,
        }),
    ))
}
