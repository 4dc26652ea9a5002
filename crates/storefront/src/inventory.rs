//! Atomic stock ledger.
//!
//! Stock lives as one KV counter per product (`inventory:{product_id}`).
//! Reservation decrements the counter first and compensates with an
//! increment if it went negative, so concurrent buyers can never jointly
//! oversell: at most one of two racing decrements for the last unit sees a
//! non-negative result.

use std::collections::HashMap;
use std::time::Duration;

use orchard_core::ProductId;

use crate::kv::{KvClient, KvError};

const KEY_PREFIX: &str = "inventory:";

/// Stock that never expires; seeded quantities should outlive any cart.
const STOCK_TTL: Option<Duration> = None;

/// Errors from stock operations.
#[derive(Debug, thiserror::Error)]
pub enum StockError {
    /// The requested quantity exceeds what is on hand.
    #[error("insufficient stock for product {product_id}")]
    Insufficient {
        /// Product that could not be reserved.
        product_id: ProductId,
    },

    /// The KV backend failed.
    #[error(transparent)]
    Kv(#[from] KvError),
}

/// Per-product stock counters backed by the KV store.
#[derive(Clone)]
pub struct StockLedger {
    kv: KvClient,
}

impl StockLedger {
    /// Wrap a KV client.
    #[must_use]
    pub const fn new(kv: KvClient) -> Self {
        Self { kv }
    }

    fn key(product_id: &ProductId) -> String {
        format!("{KEY_PREFIX}{product_id}")
    }

    /// Current stock for a product, clamped to zero. A missing counter reads
    /// as zero.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable; callers decide
    /// whether to fail closed (checkout) or substitute a default (listings).
    pub async fn get_stock(&self, product_id: &ProductId) -> Result<i64, KvError> {
        let stock = self.kv.get_i64(&Self::key(product_id)).await?.unwrap_or(0);
        Ok(stock.max(0))
    }

    /// Stock for several products in one round trip. Missing counters read
    /// as zero; order of the input is irrelevant.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable. Missing counters
    /// are not an error.
    pub async fn get_many(
        &self,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, i64>, KvError> {
        if product_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = product_ids.iter().map(Self::key).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let values = self.kv.mget_i64(&key_refs).await?;
        Ok(product_ids
            .iter()
            .zip(values)
            .map(|(id, stock)| (id.clone(), stock.unwrap_or(0).max(0)))
            .collect())
    }

    /// Overwrite the stock counter for a product.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable.
    pub async fn set_stock(&self, product_id: &ProductId, quantity: i64) -> Result<(), KvError> {
        self.kv
            .set_raw(&Self::key(product_id), &quantity.to_string(), STOCK_TTL)
            .await
    }

    /// Atomically reserve `quantity` units.
    ///
    /// Decrements the counter and, if the result went negative, puts the
    /// units back before failing. Returns the remaining stock on success.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Insufficient`] when not enough units are on
    /// hand, or [`StockError::Kv`] on backend failure (including a failed
    /// compensating increment, which leaves the counter short).
    pub async fn decrement(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<i64, StockError> {
        let key = Self::key(product_id);
        let remaining = self.kv.decr_by(&key, i64::from(quantity)).await?;
        if remaining < 0 {
            self.kv.incr_by(&key, i64::from(quantity)).await?;
            return Err(StockError::Insufficient {
                product_id: product_id.clone(),
            });
        }
        Ok(remaining)
    }

    /// Return `quantity` units to stock (restock or manual correction).
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable.
    pub async fn increment(&self, product_id: &ProductId, quantity: u32) -> Result<i64, KvError> {
        self.kv
            .incr_by(&Self::key(product_id), i64::from(quantity))
            .await
    }
}
