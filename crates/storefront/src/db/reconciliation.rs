//! Stock reconciliation records.
//!
//! The finalization saga runs forward only: once payment is captured, a
//! failed stock decrement must not fail the order. It is recorded here
//! instead, for a human to resolve (restock, refund, or manual correction).
//! Exposed read-only through the admin API.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use orchard_core::ProductId;
use serde::Serialize;
use sqlx::{PgPool, Row};

/// One unresolved stock discrepancy.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationEntry {
    pub id: i64,
    pub stripe_session_id: String,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Why the decrement did not happen (insufficient stock, backend down,
    /// unresolved product id).
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Reconciliation storage with Postgres and in-memory variants.
#[derive(Clone)]
pub enum ReconciliationStore {
    Postgres(PgPool),
    Memory(Arc<Mutex<Vec<ReconciliationEntry>>>),
}

impl ReconciliationStore {
    /// Postgres-backed store.
    #[must_use]
    pub const fn postgres(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    /// In-memory store for local development and tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(Mutex::new(Vec::new())))
    }

    /// Record a discrepancy.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` on database failure; callers log and continue,
    /// this is never allowed to fail the saga.
    pub async fn record(
        &self,
        stripe_session_id: &str,
        product_id: &ProductId,
        quantity: u32,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query(
                    r"
                    INSERT INTO stock_reconciliation
                        (stripe_session_id, product_id, quantity, reason)
                    VALUES ($1, $2, $3, $4)
                    ",
                )
                .bind(stripe_session_id)
                .bind(product_id)
                .bind(i64::from(quantity))
                .bind(reason)
                .execute(pool)
                .await?;
                Ok(())
            }
            Self::Memory(entries) => {
                let mut entries = entries
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                let id = i64::try_from(entries.len()).unwrap_or(i64::MAX) + 1;
                entries.push(ReconciliationEntry {
                    id,
                    stripe_session_id: stripe_session_id.to_owned(),
                    product_id: product_id.clone(),
                    quantity,
                    reason: reason.to_owned(),
                    created_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// All recorded discrepancies, newest first.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` on database failure.
    pub async fn list(&self) -> Result<Vec<ReconciliationEntry>, sqlx::Error> {
        match self {
            Self::Postgres(pool) => {
                let rows = sqlx::query(
                    "SELECT id, stripe_session_id, product_id, quantity, reason, created_at
                     FROM stock_reconciliation ORDER BY created_at DESC",
                )
                .fetch_all(pool)
                .await?;
                rows.into_iter()
                    .map(|row| {
                        let quantity: i64 = row.try_get("quantity")?;
                        Ok(ReconciliationEntry {
                            id: row.try_get("id")?,
                            stripe_session_id: row.try_get("stripe_session_id")?,
                            product_id: row.try_get("product_id")?,
                            quantity: u32::try_from(quantity).unwrap_or(0),
                            reason: row.try_get("reason")?,
                            created_at: row.try_get("created_at")?,
                        })
                    })
                    .collect()
            }
            Self::Memory(entries) => {
                let mut entries = entries
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .clone();
                entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok(entries)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_list() {
        let store = ReconciliationStore::in_memory();
        store
            .record("cs_1", &ProductId::new("prod_001"), 2, "insufficient stock")
            .await
            .unwrap();
        store
            .record("cs_2", &ProductId::new("prod_002"), 1, "stock backend unavailable")
            .await
            .unwrap();

        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.reason == "insufficient stock"));
    }

    #[tokio::test]
    async fn test_empty_list() {
        let store = ReconciliationStore::in_memory();
        assert!(store.list().await.unwrap().is_empty());
    }
}
