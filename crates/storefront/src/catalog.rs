//! Product catalog.
//!
//! Product metadata is one JSON document at `products:all`, read through a
//! short-lived in-process cache. The catalog self-seeds with the built-in
//! defaults when the key is absent, so a fresh deployment serves products
//! immediately.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use orchard_core::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::kv::{KvClient, KvError};

const PRODUCTS_KEY: &str = "products:all";
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Catalog product metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub title: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
    pub images: Vec<String>,
    pub category: String,
    pub rating: f32,
    pub review_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub featured: bool,
}

/// Normalize arbitrary user/URL input into slug form: lowercased, unicode
/// dashes and separators collapsed to `-`, `&` spelled out, anything else
/// url-unsafe replaced, runs of dashes collapsed, edge dashes trimmed.
#[must_use]
pub fn normalize_slug(input: &str) -> String {
    let mut mapped = String::with_capacity(input.len());
    for c in input.trim().to_lowercase().chars() {
        match c {
            '\u{2010}'..='\u{2015}' => mapped.push('-'),
            '&' => mapped.push_str("and"),
            c if c.is_whitespace() || c == '/' => mapped.push('-'),
            'a'..='z' | '0'..='9' | '-' => mapped.push(c),
            _ => mapped.push('-'),
        }
    }
    let mut out = String::with_capacity(mapped.len());
    let mut prev_dash = false;
    for c in mapped.chars() {
        if c == '-' {
            if !prev_dash {
                out.push('-');
            }
            prev_dash = true;
        } else {
            out.push(c);
            prev_dash = false;
        }
    }
    out.trim_matches('-').to_owned()
}

/// Candidate slug forms for a raw path segment: as-is, URL-decoded, and
/// decoded per `/`-separated segment.
fn slug_candidates(raw: &str) -> Vec<String> {
    let mut candidates = vec![raw.to_owned()];
    if let Ok(decoded) = urlencoding::decode(raw) {
        candidates.push(decoded.into_owned());
    }
    let per_segment: String = raw
        .split('/')
        .map(|seg| {
            urlencoding::decode(seg).map_or_else(|_| seg.to_owned(), std::borrow::Cow::into_owned)
        })
        .collect::<Vec<_>>()
        .join("/");
    candidates.push(per_segment);
    candidates.dedup();
    candidates
}

/// Read-side catalog access with an in-process cache.
#[derive(Clone)]
pub struct CatalogReader {
    kv: KvClient,
    cache: Cache<&'static str, Arc<Vec<Product>>>,
}

impl CatalogReader {
    /// Build a reader over the KV store.
    #[must_use]
    pub fn new(kv: KvClient) -> Self {
        Self {
            kv,
            cache: Cache::builder()
                .max_capacity(1)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    /// The built-in catalog used until real products are saved.
    #[must_use]
    pub fn default_products() -> Vec<Product> {
        vec![
            Product {
                id: ProductId::new("prod_001"),
                slug: "wireless-earbuds-pro".to_owned(),
                title: "Wireless Earbuds Pro".to_owned(),
                price: Decimal::new(7999, 2),
                original_price: Some(Decimal::new(9999, 2)),
                images: vec![
                    "https://images.unsplash.com/photo-1590658268037-6bf12165a8df?w=600".to_owned(),
                ],
                category: "electronics".to_owned(),
                rating: 4.5,
                review_count: 1250,
                description: None,
                featured: true,
            },
            Product {
                id: ProductId::new("prod_002"),
                slug: "smart-fitness-watch".to_owned(),
                title: "Smart Fitness Watch".to_owned(),
                price: Decimal::new(14999, 2),
                original_price: Some(Decimal::new(19999, 2)),
                images: vec![
                    "https://images.unsplash.com/photo-1523275335684-37898b6baf30?w=600".to_owned(),
                ],
                category: "electronics".to_owned(),
                rating: 4.7,
                review_count: 3420,
                description: None,
                featured: true,
            },
        ]
    }

    async fn load(&self) -> Arc<Vec<Product>> {
        match self.kv.get_json::<Vec<Product>>(PRODUCTS_KEY).await {
            Ok(Some(products)) if !products.is_empty() => Arc::new(products),
            Ok(_) => {
                // Absent or empty: seed the defaults so admin tooling and the
                // storefront share one source of truth.
                let defaults = Self::default_products();
                if let Err(e) = self.kv.set_json(PRODUCTS_KEY, &defaults, None).await {
                    tracing::warn!(error = %e, "failed to seed default catalog");
                }
                Arc::new(defaults)
            }
            Err(e) => {
                tracing::warn!(error = %e, "catalog fetch failed, serving defaults");
                Arc::new(Self::default_products())
            }
        }
    }

    /// All products, cached for a few minutes.
    pub async fn get_products(&self) -> Arc<Vec<Product>> {
        self.cache.get_with("all", self.load()).await
    }

    /// Look up a product by id.
    pub async fn get_by_id(&self, product_id: &ProductId) -> Option<Product> {
        self.get_products()
            .await
            .iter()
            .find(|p| &p.id == product_id)
            .cloned()
    }

    /// Look up a product by a raw slug from the URL. Tries the raw, decoded,
    /// and per-segment-decoded forms, each exactly and after normalization.
    pub async fn get_by_slug(&self, raw: &str) -> Option<Product> {
        let products = self.get_products().await;
        let candidates = slug_candidates(raw);

        for candidate in &candidates {
            if let Some(product) = products.iter().find(|p| &p.slug == candidate) {
                return Some(product.clone());
            }
        }
        for candidate in &candidates {
            let normalized = normalize_slug(candidate);
            if normalized.is_empty() {
                continue;
            }
            if let Some(product) = products
                .iter()
                .find(|p| normalize_slug(&p.slug) == normalized)
            {
                return Some(product.clone());
            }
        }
        None
    }

    /// Replace the stored catalog (seeding and admin tooling).
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend write fails.
    pub async fn save_products(&self, products: &[Product]) -> Result<(), KvError> {
        self.kv.set_json(PRODUCTS_KEY, &products, None).await?;
        self.cache.invalidate("all").await;
        Ok(())
    }
}
