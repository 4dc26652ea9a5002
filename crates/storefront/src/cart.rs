//! Session-keyed cart store.
//!
//! Carts are JSON documents at `cart:{session_id}` with a sliding expiry:
//! every save rewrites the document with a fresh TTL, so active carts stay
//! alive and abandoned ones age out. Reads degrade to an empty cart when the
//! backend is unavailable; writes surface the failure.
//!
//! Mutations are read-modify-write without a lock. Two concurrent writers to
//! the same session can lose one update; a single shopper's requests are
//! effectively serial, so this is accepted.

use std::time::Duration;

use chrono::Utc;
use orchard_core::{Email, ProductId, SessionId};
use serde::{Deserialize, Serialize};

use crate::kv::{KvClient, KvError};

/// How long an untouched cart survives.
pub const CART_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One product line in a cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Catalog product id.
    pub product_id: ProductId,
    /// Units of the product, always at least 1.
    pub quantity: u32,
    /// When the line first appeared, epoch milliseconds.
    pub added_at: i64,
}

/// A shopper's cart document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// Product lines; one entry per distinct product.
    pub items: Vec<CartItem>,
    /// Contact email, captured at checkout for recovery reminders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    /// Last mutation time, epoch milliseconds. Strictly advances on every
    /// save, even within one millisecond.
    pub updated_at: i64,
}

impl Cart {
    fn empty() -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            items: Vec::new(),
            email: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up the line for a product.
    #[must_use]
    pub fn find(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cart persistence with sliding expiry.
#[derive(Clone)]
pub struct CartStore {
    kv: KvClient,
    ttl: Duration,
}

impl CartStore {
    /// Store with the standard seven-day sliding TTL.
    #[must_use]
    pub const fn new(kv: KvClient) -> Self {
        Self { kv, ttl: CART_TTL }
    }

    /// Store with a custom TTL, for expiry tests.
    #[must_use]
    pub const fn with_ttl(kv: KvClient, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn key(session_id: &SessionId) -> String {
        format!("cart:{session_id}")
    }

    /// Fetch a session's cart. Missing, expired, or unreadable carts come
    /// back empty; backend failures are logged and degrade to empty too, so
    /// a KV outage never breaks browsing.
    pub async fn get_cart(&self, session_id: &SessionId) -> Cart {
        match self.kv.get_json::<Cart>(&Self::key(session_id)).await {
            Ok(Some(cart)) => cart,
            Ok(None) => Cart::empty(),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "cart fetch failed, serving empty cart");
                Cart::empty()
            }
        }
    }

    /// Persist a cart, bumping `updated_at` and resetting the TTL.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend write fails; the mutation is lost.
    pub async fn save_cart(&self, session_id: &SessionId, mut cart: Cart) -> Result<Cart, KvError> {
        let now = Utc::now().timestamp_millis();
        cart.updated_at = now.max(cart.updated_at + 1);
        self.kv
            .set_json(&Self::key(session_id), &cart, Some(self.ttl))
            .await?;
        Ok(cart)
    }

    /// Add `quantity` units of a product, merging into an existing line.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend write fails.
    pub async fn add_to_cart(
        &self,
        session_id: &SessionId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart, KvError> {
        let mut cart = self.get_cart(session_id).await;
        match cart
            .items
            .iter_mut()
            .find(|item| &item.product_id == product_id)
        {
            Some(item) => item.quantity = item.quantity.saturating_add(quantity),
            None => cart.items.push(CartItem {
                product_id: product_id.clone(),
                quantity,
                added_at: Utc::now().timestamp_millis(),
            }),
        }
        self.save_cart(session_id, cart).await
    }

    /// Set a line's quantity. Zero or negative removes the line entirely.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend write fails.
    pub async fn update_item(
        &self,
        session_id: &SessionId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<Cart, KvError> {
        let mut cart = self.get_cart(session_id).await;
        if quantity <= 0 {
            cart.items.retain(|item| &item.product_id != product_id);
        } else {
            let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
            match cart
                .items
                .iter_mut()
                .find(|item| &item.product_id == product_id)
            {
                Some(item) => item.quantity = quantity,
                None => cart.items.push(CartItem {
                    product_id: product_id.clone(),
                    quantity,
                    added_at: Utc::now().timestamp_millis(),
                }),
            }
        }
        self.save_cart(session_id, cart).await
    }

    /// Remove a product's line. Removing an absent product is a no-op that
    /// still refreshes the TTL.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend write fails.
    pub async fn remove_item(
        &self,
        session_id: &SessionId,
        product_id: &ProductId,
    ) -> Result<Cart, KvError> {
        self.update_item(session_id, product_id, 0).await
    }

    /// Attach a contact email to the cart (captured at checkout).
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend write fails.
    pub async fn set_email(&self, session_id: &SessionId, email: &Email) -> Result<Cart, KvError> {
        let mut cart = self.get_cart(session_id).await;
        cart.email = Some(email.as_str().to_owned());
        self.save_cart(session_id, cart).await
    }

    /// Delete the cart document outright (after a completed order).
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend is unreachable.
    pub async fn clear(&self, session_id: &SessionId) -> Result<(), KvError> {
        self.kv.del(&Self::key(session_id)).await
    }

    /// Sessions whose cart has items, an email, and no activity for
    /// `older_than_hours` hours. Used for recovery reminders.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend scan fails.
    pub async fn abandoned_sessions(
        &self,
        older_than_hours: u64,
    ) -> Result<Vec<SessionId>, KvError> {
        let cutoff = Utc::now().timestamp_millis()
            - i64::try_from(older_than_hours * 60 * 60 * 1000).unwrap_or(i64::MAX);
        let keys = self.kv.scan_keys("cart:*").await?;
        let mut sessions = Vec::new();
        for key in keys {
            let Some(session_id) = key.strip_prefix("cart:") else {
                continue;
            };
            let session_id = SessionId::new(session_id);
            let cart = self.get_cart(&session_id).await;
            if !cart.is_empty() && cart.email.is_some() && cart.updated_at < cutoff {
                sessions.push(session_id);
            }
        }
        Ok(sessions)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store() -> CartStore {
        CartStore::new(KvClient::in_memory())
    }

    fn session() -> SessionId {
        SessionId::new("sess_test")
    }

    #[tokio::test]
    async fn test_missing_cart_is_empty() {
        let cart = store().get_cart(&session()).await;
        assert!(cart.is_empty());
        assert!(cart.email.is_none());
    }

    #[tokio::test]
    async fn test_add_merges_same_product() {
        let store = store();
        let sess = session();
        let id = ProductId::new("prod_001");

        store.add_to_cart(&sess, &id, 2).await.unwrap();
        let cart = store.add_to_cart(&sess, &id, 3).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.find(&id).unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_add_keeps_distinct_products_separate() {
        let store = store();
        let sess = session();
        store
            .add_to_cart(&sess, &ProductId::new("prod_001"), 1)
            .await
            .unwrap();
        let cart = store
            .add_to_cart(&sess, &ProductId::new("prod_002"), 1)
            .await
            .unwrap();
        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.total_quantity(), 2);
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let store = store();
        let sess = session();
        let id = ProductId::new("prod_001");
        store.add_to_cart(&sess, &id, 2).await.unwrap();

        let cart = store.update_item(&sess, &id, 0).await.unwrap();
        assert!(cart.find(&id).is_none());
    }

    #[tokio::test]
    async fn test_negative_quantity_removes_line() {
        let store = store();
        let sess = session();
        let id = ProductId::new("prod_001");
        store.add_to_cart(&sess, &id, 2).await.unwrap();

        let cart = store.update_item(&sess, &id, -3).await.unwrap();
        assert!(cart.find(&id).is_none());
    }

    #[tokio::test]
    async fn test_remove_absent_product_is_noop() {
        let store = store();
        let sess = session();
        store
            .add_to_cart(&sess, &ProductId::new("prod_001"), 1)
            .await
            .unwrap();
        let cart = store
            .remove_item(&sess, &ProductId::new("prod_404"))
            .await
            .unwrap();
        assert_eq!(cart.items.len(), 1);
    }

    #[tokio::test]
    async fn test_updated_at_strictly_advances() {
        let store = store();
        let sess = session();
        let id = ProductId::new("prod_001");

        let first = store.add_to_cart(&sess, &id, 1).await.unwrap();
        let second = store.add_to_cart(&sess, &id, 1).await.unwrap();
        assert!(second.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn test_created_at_survives_mutations() {
        let store = store();
        let sess = session();
        let id = ProductId::new("prod_001");

        let first = store.add_to_cart(&sess, &id, 1).await.unwrap();
        let second = store.update_item(&sess, &id, 5).await.unwrap();
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_expired_cart_reads_empty() {
        let kv = KvClient::in_memory();
        let store = CartStore::with_ttl(kv, Duration::from_millis(0));
        let sess = session();
        store
            .add_to_cart(&sess, &ProductId::new("prod_001"), 1)
            .await
            .unwrap();
        assert!(store.get_cart(&sess).await.is_empty());
    }

    #[tokio::test]
    async fn test_write_slides_expiry_forward() {
        let kv = KvClient::in_memory();
        let store = CartStore::with_ttl(kv, Duration::from_millis(100));
        let sess = session();
        let id = ProductId::new("prod_001");

        store.add_to_cart(&sess, &id, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        // The second write restarts the TTL from now.
        store.add_to_cart(&sess, &id, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // 120ms past the first write, 60ms past the refresh: still alive.
        let cart = store.get_cart(&sess).await;
        assert_eq!(cart.find(&id).unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_add_saturates_instead_of_overflowing() {
        let store = store();
        let sess = session();
        let id = ProductId::new("prod_001");

        store.add_to_cart(&sess, &id, u32::MAX - 1).await.unwrap();
        let cart = store.add_to_cart(&sess, &id, 5).await.unwrap();
        assert_eq!(cart.find(&id).unwrap().quantity, u32::MAX);
    }

    #[tokio::test]
    async fn test_clear_removes_cart() {
        let store = store();
        let sess = session();
        store
            .add_to_cart(&sess, &ProductId::new("prod_001"), 1)
            .await
            .unwrap();
        store.clear(&sess).await.unwrap();
        assert!(store.get_cart(&sess).await.is_empty());
    }

    #[tokio::test]
    async fn test_set_email() {
        let store = store();
        let sess = session();
        let email = Email::parse("shopper@example.com").unwrap();
        let cart = store.set_email(&sess, &email).await.unwrap();
        assert_eq!(cart.email.as_deref(), Some("shopper@example.com"));
    }

    #[tokio::test]
    async fn test_stale_writer_loses_update() {
        // Documented last-writer-wins behavior for concurrent mutations:
        // a writer that read before another's save overwrites that save.
        let store = store();
        let sess = session();
        let id = ProductId::new("prod_001");

        let stale = store.add_to_cart(&sess, &id, 1).await.unwrap();
        store.add_to_cart(&sess, &id, 1).await.unwrap();
        let after = store.save_cart(&sess, stale).await.unwrap();
        assert_eq!(after.find(&id).unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_abandoned_sessions_require_email_and_age() {
        let store = store();
        let id = ProductId::new("prod_001");

        // Aged cart with email: eligible.
        let aged = SessionId::new("sess_aged");
        let mut cart = store.add_to_cart(&aged, &id, 1).await.unwrap();
        cart.email = Some("shopper@example.com".to_owned());
        cart.updated_at = Utc::now().timestamp_millis() - 48 * 60 * 60 * 1000;
        // Write directly to avoid save_cart bumping updated_at.
        store
            .kv
            .set_json("cart:sess_aged", &cart, Some(CART_TTL))
            .await
            .unwrap();

        // Fresh cart with email: too recent.
        let fresh = SessionId::new("sess_fresh");
        store.add_to_cart(&fresh, &id, 1).await.unwrap();
        store
            .set_email(&fresh, &Email::parse("other@example.com").unwrap())
            .await
            .unwrap();

        // Aged cart without email: unreachable.
        let anonymous = SessionId::new("sess_anon");
        let mut cart = store.add_to_cart(&anonymous, &id, 1).await.unwrap();
        cart.updated_at = Utc::now().timestamp_millis() - 48 * 60 * 60 * 1000;
        store
            .kv
            .set_json("cart:sess_anon", &cart, Some(CART_TTL))
            .await
            .unwrap();

        let sessions = store.abandoned_sessions(24).await.unwrap();
        assert_eq!(sessions, vec![aged]);
    }

    #[test]
    fn test_cart_serializes_camel_case() {
        let cart = Cart {
            items: vec![CartItem {
                product_id: ProductId::new("prod_001"),
                quantity: 2,
                added_at: 1_700_000_000_000,
            }],
            email: None,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_001,
        };
        let json = serde_json::to_value(&cart).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("email").is_none());
        assert!(json["items"][0].get("productId").is_some());
    }
}
