//! Retailer scraping.
//!
//! One [`RetailerScraper`] type serves every supermarket. What differs per
//! retailer is data: a search URL template and four CSS locators, held in a
//! [`RetailerConfig`]. Pages are loaded through a [`PageFetcher`] so the
//! transport can be swapped out in tests.

pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod retailers;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use tea_lovers_core::Store;

use crate::models::ScrapeResult;

pub use extract::{CompiledLocators, ExtractionError, SelectorError, extract_products};
pub use fetch::{FetchError, HttpPageFetcher, PageFetcher, PageSession};
pub use normalize::normalize_price;

/// CSS locators for a retailer's result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locators {
    /// Element holding the result list.
    pub container: String,
    /// One product, searched within the container.
    pub item: String,
    /// Product name, searched within an item.
    pub name: String,
    /// Price text, searched within an item.
    pub price: String,
}

/// Everything needed to scrape one retailer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetailerConfig {
    pub store: Store,
    /// Search page URL; `{}` is replaced by the percent-encoded term.
    pub url_template: String,
    pub locators: Locators,
}

impl RetailerConfig {
    /// The search page URL for `term`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidUrl` if the filled-in template is not a URL.
    pub fn search_url(&self, term: &str) -> Result<Url, FetchError> {
        let raw = self
            .url_template
            .replace("{}", &urlencoding::encode(term.trim()));
        Url::parse(&raw).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))
    }
}

/// Why a scrape attempt produced nothing.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl ScrapeError {
    /// Only transport failures are worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(err) => err.is_retryable(),
            Self::Extraction(_) => false,
        }
    }
}

/// Scrapes one retailer's search results.
pub struct RetailerScraper<F> {
    config: RetailerConfig,
    locators: CompiledLocators,
    fetcher: Arc<F>,
}

impl<F: PageFetcher> RetailerScraper<F> {
    /// Compile the retailer's locators and bind it to a fetcher.
    ///
    /// # Errors
    ///
    /// Returns `SelectorError` if a locator is not a valid CSS selector.
    pub fn new(config: RetailerConfig, fetcher: Arc<F>) -> Result<Self, SelectorError> {
        let locators = CompiledLocators::compile(&config.locators)?;
        Ok(Self {
            config,
            locators,
            fetcher,
        })
    }

    /// The retailer this scraper serves.
    #[must_use]
    pub const fn store(&self) -> Store {
        self.config.store
    }

    /// The retailer's configuration.
    #[must_use]
    pub const fn config(&self) -> &RetailerConfig {
        &self.config
    }

    /// Load the search page for `term` and extract its products.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::Fetch` when the page never became ready and
    /// `ScrapeError::Extraction` when it did not have the expected shape.
    pub async fn try_scrape(&self, term: &str) -> Result<Vec<ScrapeResult>, ScrapeError> {
        let url = self.config.search_url(term)?;
        tracing::debug!(url = %url, "Loading search page");
        let html = self.fetcher.fetch_page(&url).await?;
        Ok(extract_products(&html, &self.locators, self.config.store)?)
    }

    /// Like [`Self::try_scrape`], but failures are logged and yield no products.
    pub async fn scrape(&self, term: &str) -> Vec<ScrapeResult> {
        match self.try_scrape(term).await {
            Ok(results) => results,
            Err(err) => {
                tracing::error!(retailer = %self.store(), term, error = %err, "Scrape failed");
                Vec::new()
            }
        }
    }
}
