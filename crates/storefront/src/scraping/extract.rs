//! Product extraction from retailer result pages.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use tea_lovers_core::Store;

use super::Locators;
use crate::models::ScrapeResult;

/// A locator that is not a valid CSS selector.
#[derive(Debug, Clone, Error)]
#[error("invalid {field} selector {selector:?}: {message}")]
pub struct SelectorError {
    pub field: &'static str,
    pub selector: String,
    pub message: String,
}

/// The page did not have the shape the locators expect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("result container {0:?} not found")]
    ContainerNotFound(String),
    #[error("no product nodes matched {0:?}")]
    NoProducts(String),
}

/// Locators compiled into selectors.
#[derive(Debug, Clone)]
pub struct CompiledLocators {
    container: Selector,
    item: Selector,
    name: Selector,
    price: Selector,
    source: Locators,
}

impl CompiledLocators {
    /// Compile all four locators.
    ///
    /// # Errors
    ///
    /// Returns `SelectorError` naming the first locator that fails to parse.
    pub fn compile(locators: &Locators) -> Result<Self, SelectorError> {
        Ok(Self {
            container: parse_selector("container", &locators.container)?,
            item: parse_selector("item", &locators.item)?,
            name: parse_selector("name", &locators.name)?,
            price: parse_selector("price", &locators.price)?,
            source: locators.clone(),
        })
    }
}

fn parse_selector(field: &'static str, selector: &str) -> Result<Selector, SelectorError> {
    Selector::parse(selector).map_err(|e| SelectorError {
        field,
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Pull `(name, price text)` pairs out of a result page.
///
/// Items without a non-empty name or price are skipped with a warning.
///
/// # Errors
///
/// Returns `ExtractionError` if the container or any item node is missing.
pub fn extract_products(
    html: &str,
    locators: &CompiledLocators,
    store: Store,
) -> Result<Vec<ScrapeResult>, ExtractionError> {
    let document = Html::parse_document(html);

    let container = document
        .select(&locators.container)
        .next()
        .ok_or_else(|| ExtractionError::ContainerNotFound(locators.source.container.clone()))?;

    let mut matched = 0_usize;
    let mut results = Vec::new();

    for (index, item) in container.select(&locators.item).enumerate() {
        matched += 1;

        let Some(name) = first_text(item, &locators.name) else {
            tracing::warn!(index, "Skipping product without a name");
            continue;
        };
        let Some(price) = first_text(item, &locators.price) else {
            tracing::warn!(index, name = %name, "Skipping product without a price");
            continue;
        };

        results.push(ScrapeResult {
            store,
            raw_name: name,
            raw_price_text: price,
        });
    }

    if matched == 0 {
        return Err(ExtractionError::NoProducts(locators.source.item.clone()));
    }

    tracing::debug!(matched, extracted = results.len(), "Extracted products");
    Ok(results)
}

/// Whitespace-collapsed text of the first match, if it has any.
fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let node = element.select(selector).next()?;
    let text = node.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}
