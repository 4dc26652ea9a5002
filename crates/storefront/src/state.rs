//! Shared application state.

use sqlx::PgPool;

use crate::cart::CartStore;
use crate::catalog::CatalogReader;
use crate::config::StorefrontConfig;
use crate::db::orders::OrderStore;
use crate::db::reconciliation::ReconciliationStore;
use crate::inventory::StockLedger;
use crate::kv::KvClient;
use crate::services::email::EmailService;
use crate::services::stripe::StripeClient;

/// Errors constructing application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("email transport error: {0}")]
    Email(#[from] lettre::transport::smtp::Error),
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    kv: KvClient,
    ledger: StockLedger,
    carts: CartStore,
    catalog: CatalogReader,
    orders: OrderStore,
    reconciliation: ReconciliationStore,
    stripe: StripeClient,
    mailer: Option<EmailService>,
}

/// Application state shared across request handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: std::sync::Arc<AppStateInner>,
}

impl AppState {
    /// Assemble state from configuration and an optional database pool.
    ///
    /// Without a pool, orders and reconciliation records live in memory;
    /// without KV credentials, so do carts, stock, and the catalog. Both
    /// degradations log a warning at startup.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the SMTP transport cannot be configured.
    pub fn new(config: StorefrontConfig, pool: Option<PgPool>) -> Result<Self, StateError> {
        let kv = KvClient::from_config(config.kv.as_ref());
        let (orders, reconciliation) = match &pool {
            Some(pool) => (
                OrderStore::postgres(pool.clone()),
                ReconciliationStore::postgres(pool.clone()),
            ),
            None => {
                tracing::warn!(
                    "DATABASE_URL not configured, orders will be kept in memory \
                     (data will not persist across restarts)"
                );
                (OrderStore::in_memory(), ReconciliationStore::in_memory())
            }
        };
        let mailer = match &config.smtp {
            Some(smtp) => Some(EmailService::new(smtp, &config.base_url)?),
            None => {
                tracing::info!("SMTP not configured, transactional email disabled");
                None
            }
        };

        Ok(Self {
            inner: std::sync::Arc::new(AppStateInner {
                ledger: StockLedger::new(kv.clone()),
                carts: CartStore::new(kv.clone()),
                catalog: CatalogReader::new(kv.clone()),
                stripe: StripeClient::new(&config.stripe),
                orders,
                reconciliation,
                mailer,
                kv,
                pool,
                config,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Database pool, when a database is configured.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn kv(&self) -> &KvClient {
        &self.inner.kv
    }

    #[must_use]
    pub fn ledger(&self) -> &StockLedger {
        &self.inner.ledger
    }

    #[must_use]
    pub fn carts(&self) -> &CartStore {
        &self.inner.carts
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogReader {
        &self.inner.catalog
    }

    #[must_use]
    pub fn orders(&self) -> &OrderStore {
        &self.inner.orders
    }

    #[must_use]
    pub fn reconciliation(&self) -> &ReconciliationStore {
        &self.inner.reconciliation
    }

    #[must_use]
    pub fn stripe(&self) -> &StripeClient {
        &self.inner.stripe
    }

    #[must_use]
    pub fn mailer(&self) -> Option<&EmailService> {
        self.inner.mailer.as_ref()
    }
}
