//! Cross-store catalog view.
//!
//! # Pagination
//!
//! Every selected store is paged on its own cursor: for page `n` (1-based)
//! store `s` shows rows `[(n - 1) * store_page_size, n * store_page_size)` of
//! its own matches, ordered by product id. Stores have different match
//! counts, so each page carries its own `total`, `total_pages` and
//! `has_next`; a store that runs out first simply shows an empty page.
//!
//! The merged view is the union of all selected stores' matches, ordered by
//! product id and sliced the same way with `merged_page_size`. A product
//! belongs to exactly one store, so the union has no duplicates.

use serde::Serialize;

use tea_lovers_core::{Store, StoreParseError};

use crate::config::CatalogConfig;
use crate::db::{CatalogStore, RepositoryError};
use crate::models::Product;

/// A validated catalog request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    /// Case-insensitive substring to match names against. Empty matches everything.
    pub term: String,
    /// Selected stores, deduplicated, in listing order.
    pub stores: Vec<Store>,
    /// 1-based page number.
    pub page: u32,
}

impl CatalogQuery {
    /// Build a query from raw request parameters.
    ///
    /// # Errors
    ///
    /// Returns `StoreParseError` if a selected store is unknown.
    pub fn parse(
        term: Option<&str>,
        stores: Option<&str>,
        page: Option<&str>,
    ) -> Result<Self, StoreParseError> {
        Ok(Self {
            term: term.map(str::trim).unwrap_or_default().to_string(),
            stores: parse_stores(stores)?,
            page: parse_page(page),
        })
    }
}

/// Parse a page number. Missing, malformed and zero all mean page 1.
#[must_use]
pub fn parse_page(raw: Option<&str>) -> u32 {
    raw.and_then(|p| p.trim().parse::<u32>().ok())
        .filter(|p| *p > 0)
        .unwrap_or(1)
}

/// Parse a comma-separated store selection. An empty selection means every store.
///
/// # Errors
///
/// Returns `StoreParseError` for the first unknown store.
pub fn parse_stores(raw: Option<&str>) -> Result<Vec<Store>, StoreParseError> {
    let mut selected = Vec::new();
    for part in raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        selected.push(part.parse::<Store>()?);
    }
    if selected.is_empty() {
        return Ok(Store::ALL.to_vec());
    }
    Ok(Store::ALL
        .into_iter()
        .filter(|s| selected.contains(s))
        .collect())
}

/// Offset of the first row on `page`.
#[must_use]
pub fn page_offset(page: u32, page_size: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(page_size)
}

/// Position of one page within a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
}

impl PageInfo {
    #[must_use]
    pub fn new(page: u32, page_size: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(u64::from(page_size.max(1)));
        Self {
            page,
            page_size,
            total,
            total_pages,
            has_next: u64::from(page) < total_pages,
        }
    }
}

/// One store's page of matches.
#[derive(Debug, Clone, Serialize)]
pub struct StorePage {
    pub store: Store,
    pub products: Vec<Product>,
    #[serde(flatten)]
    pub info: PageInfo,
}

/// A page of the merged cross-store view.
#[derive(Debug, Clone, Serialize)]
pub struct MergedPage {
    pub products: Vec<Product>,
    #[serde(flatten)]
    pub info: PageInfo,
}

/// Everything the catalog listing shows for one request.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogView {
    pub term: String,
    pub page: u32,
    pub stores: Vec<StorePage>,
    pub merged: MergedPage,
}

/// Query per-store and merged pages for `query`.
///
/// # Errors
///
/// Returns `RepositoryError` if the store fails.
pub async fn catalog_view<S: CatalogStore>(
    catalog: &S,
    query: &CatalogQuery,
    sizes: CatalogConfig,
) -> Result<CatalogView, RepositoryError> {
    let mut stores = Vec::with_capacity(query.stores.len());
    for store in &query.stores {
        let total = catalog.count_store(*store, &query.term).await?;
        let products = catalog
            .search_store(
                *store,
                &query.term,
                page_offset(query.page, sizes.store_page_size),
                u64::from(sizes.store_page_size),
            )
            .await?;
        stores.push(StorePage {
            store: *store,
            products,
            info: PageInfo::new(query.page, sizes.store_page_size, total),
        });
    }

    let merged_total = catalog.count_merged(&query.stores, &query.term).await?;
    let merged_products = catalog
        .search_merged(
            &query.stores,
            &query.term,
            page_offset(query.page, sizes.merged_page_size),
            u64::from(sizes.merged_page_size),
        )
        .await?;

    Ok(CatalogView {
        term: query.term.clone(),
        page: query.page,
        stores,
        merged: MergedPage {
            products: merged_products,
            info: PageInfo::new(query.page, sizes.merged_page_size, merged_total),
        },
    })
}
