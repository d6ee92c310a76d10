//! Catalog products and the transient rows scrapers produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tea_lovers_core::{Price, ProductId, Store};

/// A persisted catalog product.
///
/// At most one product exists per `(store, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub store: Store,
    pub name: String,
    pub price: Price,
    pub created_at: DateTime<Utc>,
}

/// A product observed by a scraper or submitted to a basket, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub store: Store,
    pub name: String,
    pub price: Price,
}

/// One raw `(name, price text)` pair pulled off a retailer page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeResult {
    pub store: Store,
    pub raw_name: String,
    pub raw_price_text: String,
}
