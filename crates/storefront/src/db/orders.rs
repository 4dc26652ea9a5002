//! Order persistence.
//!
//! [`OrderStore`] has a Postgres variant selected when `DATABASE_URL` is
//! configured and an in-memory variant for local development and tests; both
//! honor the same contract. The important invariant is idempotent creation:
//! orders are unique on the Stripe session id, and inserting a duplicate is
//! a no-op success reporting `created: false`, which is what lets the
//! webhook saga tolerate redelivery.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use orchard_core::{OrderId, OrderStatus, ProductId, SessionId, StatusTransitionError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row, postgres::PgRow};

/// Errors from order storage.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] StatusTransitionError),

    #[error("order serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be interpreted (e.g. unknown status string).
    #[error("order data corruption: {0}")]
    DataCorruption(String),
}

/// Shipping destination captured by the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// A purchased line item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Catalog product id; empty when it could not be recovered from the
    /// provider (flagged for reconciliation).
    pub product_id: ProductId,
    pub product_title: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// A stored order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    /// Cart session the order came from.
    pub session_id: SessionId,
    pub customer_email: String,
    /// Payment provider's checkout session id; unique per order.
    pub stripe_session_id: String,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inputs for creating an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub session_id: SessionId,
    pub customer_email: String,
    pub stripe_session_id: String,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub shipping_address: Option<ShippingAddress>,
    pub items: Vec<OrderItem>,
}

/// Result of an order creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOutcome {
    pub order_id: OrderId,
    /// `false` when an order for the same Stripe session already existed.
    pub created: bool,
}

/// Order storage with Postgres and in-memory variants.
#[derive(Clone)]
pub enum OrderStore {
    Postgres(PgOrderRepository),
    Memory(MemoryOrderStore),
}

impl OrderStore {
    /// Postgres-backed store.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self::Postgres(PgOrderRepository { pool })
    }

    /// In-memory store for local development and tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::Memory(MemoryOrderStore::default())
    }

    /// Create an order, unique on its Stripe session id.
    ///
    /// A duplicate is a no-op success: the existing order's id comes back
    /// with `created: false`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError`] on storage failure.
    pub async fn create(&self, order: NewOrder) -> Result<CreateOutcome, OrderError> {
        match self {
            Self::Postgres(repo) => repo.create(order).await,
            Self::Memory(store) => Ok(store.create(order)),
        }
    }

    /// Fetch an order by its id.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError`] on storage failure.
    pub async fn get_by_id(&self, order_id: OrderId) -> Result<Option<Order>, OrderError> {
        match self {
            Self::Postgres(repo) => repo.get_by_id(order_id).await,
            Self::Memory(store) => Ok(store.get_by_id(order_id)),
        }
    }

    /// Fetch an order by its Stripe session id.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError`] on storage failure.
    pub async fn get_by_stripe_session(
        &self,
        stripe_session_id: &str,
    ) -> Result<Option<Order>, OrderError> {
        match self {
            Self::Postgres(repo) => repo.get_by_stripe_session(stripe_session_id).await,
            Self::Memory(store) => Ok(store.get_by_stripe_session(stripe_session_id)),
        }
    }

    /// All orders for a customer email, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError`] on storage failure.
    pub async fn get_by_email(&self, email: &str) -> Result<Vec<Order>, OrderError> {
        match self {
            Self::Postgres(repo) => repo.get_by_email(email).await,
            Self::Memory(store) => Ok(store.get_by_email(email)),
        }
    }

    /// Move an order to a new status, enforcing forward-only transitions.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotFound`] for an unknown order and
    /// [`OrderError::InvalidTransition`] for a disallowed move.
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), OrderError> {
        match self {
            Self::Postgres(repo) => repo.update_status(order_id, status).await,
            Self::Memory(store) => store.update_status(order_id, status),
        }
    }
}

// =============================================================================
// Postgres
// =============================================================================

/// Postgres order repository.
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    async fn create(&self, order: NewOrder) -> Result<CreateOutcome, OrderError> {
        let shipping_address = order
            .shipping_address
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r"
            INSERT INTO orders (id, session_id, customer_email, stripe_session_id,
                                status, subtotal, tax, shipping, total, shipping_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (stripe_session_id) DO NOTHING
            RETURNING id
            ",
        )
        .bind(OrderId::generate())
        .bind(order.session_id.as_str())
        .bind(&order.customer_email)
        .bind(&order.stripe_session_id)
        .bind(order.status.as_str())
        .bind(order.subtotal)
        .bind(order.tax)
        .bind(order.shipping)
        .bind(order.total)
        .bind(shipping_address)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            // Lost the uniqueness race or a redelivery: report the winner.
            tx.rollback().await?;
            let existing = sqlx::query("SELECT id FROM orders WHERE stripe_session_id = $1")
                .bind(&order.stripe_session_id)
                .fetch_one(&self.pool)
                .await?;
            return Ok(CreateOutcome {
                order_id: existing.try_get("id")?,
                created: false,
            });
        };
        let order_id: OrderId = row.try_get("id")?;

        for item in &order.items {
            sqlx::query(
                r"
                INSERT INTO order_items (order_id, product_id, product_title, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(order_id)
            .bind(&item.product_id)
            .bind(&item.product_title)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(CreateOutcome {
            order_id,
            created: true,
        })
    }

    async fn get_by_id(&self, order_id: OrderId) -> Result<Option<Order>, OrderError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_by_stripe_session(
        &self,
        stripe_session_id: &str,
    ) -> Result<Option<Order>, OrderError> {
        let row = sqlx::query("SELECT * FROM orders WHERE stripe_session_id = $1")
            .bind(stripe_session_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Vec<Order>, OrderError> {
        let rows =
            sqlx::query("SELECT * FROM orders WHERE customer_email = $1 ORDER BY created_at DESC")
                .bind(email)
                .fetch_all(&self.pool)
                .await?;
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.hydrate(row).await?);
        }
        Ok(orders)
    }

    async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), OrderError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
        let current = parse_status(&row.try_get::<String, _>("status")?)?;
        current.transition(status)?;

        sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn hydrate(&self, row: PgRow) -> Result<Order, OrderError> {
        let order_id: OrderId = row.try_get("id")?;
        let item_rows = sqlx::query(
            "SELECT product_id, product_title, quantity, unit_price
             FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(item_rows.len());
        for item in item_rows {
            let quantity: i64 = item.try_get("quantity")?;
            items.push(OrderItem {
                product_id: item.try_get("product_id")?,
                product_title: item.try_get("product_title")?,
                quantity: u32::try_from(quantity)
                    .map_err(|_| OrderError::DataCorruption(format!("quantity {quantity}")))?,
                unit_price: item.try_get("unit_price")?,
            });
        }

        let shipping_address: Option<serde_json::Value> = row.try_get("shipping_address")?;
        let shipping_address = shipping_address
            .map(serde_json::from_value::<ShippingAddress>)
            .transpose()?;

        Ok(Order {
            id: order_id,
            session_id: row.try_get::<String, _>("session_id")?.into(),
            customer_email: row.try_get("customer_email")?,
            stripe_session_id: row.try_get("stripe_session_id")?,
            status: parse_status(&row.try_get::<String, _>("status")?)?,
            subtotal: row.try_get("subtotal")?,
            tax: row.try_get("tax")?,
            shipping: row.try_get("shipping")?,
            total: row.try_get("total")?,
            shipping_address,
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, OrderError> {
    raw.parse::<OrderStatus>()
        .map_err(OrderError::DataCorruption)
}

// =============================================================================
// In-memory
// =============================================================================

/// In-memory order store, keyed by Stripe session id.
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    orders: Arc<Mutex<HashMap<String, Order>>>,
}

impl MemoryOrderStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Order>> {
        self.orders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn create(&self, order: NewOrder) -> CreateOutcome {
        let mut orders = self.lock();
        if let Some(existing) = orders.get(&order.stripe_session_id) {
            return CreateOutcome {
                order_id: existing.id,
                created: false,
            };
        }
        let now = Utc::now();
        let stored = Order {
            id: OrderId::generate(),
            session_id: order.session_id,
            customer_email: order.customer_email,
            stripe_session_id: order.stripe_session_id.clone(),
            status: order.status,
            subtotal: order.subtotal,
            tax: order.tax,
            shipping: order.shipping,
            total: order.total,
            shipping_address: order.shipping_address,
            items: order.items,
            created_at: now,
            updated_at: now,
        };
        let outcome = CreateOutcome {
            order_id: stored.id,
            created: true,
        };
        orders.insert(order.stripe_session_id, stored);
        outcome
    }

    fn get_by_id(&self, order_id: OrderId) -> Option<Order> {
        self.lock().values().find(|o| o.id == order_id).cloned()
    }

    fn get_by_stripe_session(&self, stripe_session_id: &str) -> Option<Order> {
        self.lock().get(stripe_session_id).cloned()
    }

    fn get_by_email(&self, email: &str) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .lock()
            .values()
            .filter(|o| o.customer_email == email)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<(), OrderError> {
        let mut orders = self.lock();
        let order = orders
            .values_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
        order.status = order.status.transition(status)?;
        order.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_order(stripe_session_id: &str) -> NewOrder {
        NewOrder {
            session_id: SessionId::new("sess_123"),
            customer_email: "shopper@example.com".to_owned(),
            stripe_session_id: stripe_session_id.to_owned(),
            status: OrderStatus::Paid,
            subtotal: Decimal::new(15_998, 2),
            tax: Decimal::new(1160, 2),
            shipping: Decimal::ZERO,
            total: Decimal::new(17_158, 2),
            shipping_address: Some(ShippingAddress {
                name: "Pat Shopper".to_owned(),
                line1: "1 Main St".to_owned(),
                line2: None,
                city: "San Francisco".to_owned(),
                state: "CA".to_owned(),
                postal_code: "94105".to_owned(),
                country: "US".to_owned(),
            }),
            items: vec![OrderItem {
                product_id: ProductId::new("prod_001"),
                product_title: "Wireless Earbuds Pro".to_owned(),
                quantity: 2,
                unit_price: Decimal::new(7999, 2),
            }],
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let store = OrderStore::in_memory();
        let outcome = store.create(new_order("cs_1")).await.unwrap();
        assert!(outcome.created);

        let order = store.get_by_id(outcome.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.total, Decimal::new(17_158, 2));

        let by_session = store.get_by_stripe_session("cs_1").await.unwrap().unwrap();
        assert_eq!(by_session.id, outcome.order_id);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_noop() {
        let store = OrderStore::in_memory();
        let first = store.create(new_order("cs_dup")).await.unwrap();
        let second = store.create(new_order("cs_dup")).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.order_id, second.order_id);
    }

    #[tokio::test]
    async fn test_get_by_email_newest_first() {
        let store = OrderStore::in_memory();
        store.create(new_order("cs_a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let latest = store.create(new_order("cs_b")).await.unwrap();

        let orders = store.get_by_email("shopper@example.com").await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, latest.order_id);
        assert!(
            store
                .get_by_email("nobody@example.com")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_update_status_forward() {
        let store = OrderStore::in_memory();
        let outcome = store.create(new_order("cs_1")).await.unwrap();
        store
            .update_status(outcome.order_id, OrderStatus::Shipped)
            .await
            .unwrap();
        let order = store.get_by_id(outcome.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_update_status_rejects_backward() {
        let store = OrderStore::in_memory();
        let outcome = store.create(new_order("cs_1")).await.unwrap();
        let err = store
            .update_status(outcome.order_id, OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_update_status_unknown_order() {
        let store = OrderStore::in_memory();
        let err = store
            .update_status(OrderId::generate(), OrderStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound(_)));
    }
}
