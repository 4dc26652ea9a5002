//! Catalog and stock seeding command.
//!
//! Writes the built-in product catalog to the KV store and sets every
//! product's stock counter to the requested level. Uses the same KV
//! configuration as the server (`KV_REST_API_URL`/`KV_REST_API_TOKEN`), so
//! running it without credentials only seeds an in-process store and warns.

use orchard_storefront::catalog::CatalogReader;
use orchard_storefront::config::KvConfig;
use orchard_storefront::inventory::StockLedger;
use orchard_storefront::kv::KvClient;
use secrecy::SecretString;

/// Seed the catalog and set all stock counters to `stock`.
///
/// # Errors
///
/// Returns an error if a KV write fails.
pub async fn run(stock: i64) -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let kv_config = match (
        std::env::var("KV_REST_API_URL").ok(),
        std::env::var("KV_REST_API_TOKEN").ok(),
    ) {
        (Some(rest_url), Some(token)) => Some(KvConfig {
            rest_url,
            rest_token: SecretString::from(token),
        }),
        _ => {
            tracing::warn!("KV_REST_API_URL not set, seeding an in-process store only");
            None
        }
    };
    let kv = KvClient::from_config(kv_config.as_ref());

    let catalog = CatalogReader::new(kv.clone());
    let products = CatalogReader::default_products();
    catalog.save_products(&products).await?;
    tracing::info!(count = products.len(), "catalog seeded");

    let ledger = StockLedger::new(kv);
    for product in &products {
        ledger.set_stock(&product.id, stock).await?;
        tracing::info!(product_id = %product.id, stock, "stock set");
    }

    tracing::info!("Seeding complete!");
    Ok(())
}
