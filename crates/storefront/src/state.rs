//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::{CatalogConfig, StorefrontConfig};
use crate::db::{BasketStore, CatalogStore, PgStore};
use crate::scraping::{HttpPageFetcher, PageFetcher, SelectorError};
use crate::services::refresh::RefreshOrchestrator;

/// Application state shared across all handlers.
///
/// Generic over the storage backend and the page fetcher so the HTTP surface
/// can run against the in-memory store. Cheaply cloneable via `Arc`.
pub struct AppState<S = PgStore, F = HttpPageFetcher> {
    inner: Arc<AppStateInner<S, F>>,
}

struct AppStateInner<S, F> {
    catalog_config: CatalogConfig,
    store: Arc<S>,
    refresher: RefreshOrchestrator<F, S>,
}

impl<S, F> Clone for AppState<S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl AppState {
    /// Create the production state: `PostgreSQL` storage and HTTP page fetching.
    ///
    /// # Errors
    ///
    /// Returns `SelectorError` if a retailer's locators are invalid.
    pub fn new(config: &StorefrontConfig, store: PgStore) -> Result<Self, SelectorError> {
        let fetcher = Arc::new(HttpPageFetcher::from_config(&config.scraper));
        let store = Arc::new(store);
        let refresher =
            RefreshOrchestrator::from_config(&config.scraper, fetcher, Arc::clone(&store))?;
        Ok(Self::from_parts(config.catalog, store, refresher))
    }
}

impl<S, F> AppState<S, F>
where
    S: CatalogStore + BasketStore,
    F: PageFetcher,
{
    /// Assemble state from already-built parts.
    #[must_use]
    pub fn from_parts(
        catalog_config: CatalogConfig,
        store: Arc<S>,
        refresher: RefreshOrchestrator<F, S>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                catalog_config,
                store,
                refresher,
            }),
        }
    }

    /// Catalog page sizes.
    #[must_use]
    pub fn catalog_config(&self) -> CatalogConfig {
        self.inner.catalog_config
    }

    /// The storage backend.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// The refresh orchestrator.
    #[must_use]
    pub fn refresher(&self) -> &RefreshOrchestrator<F, S> {
        &self.inner.refresher
    }
}
