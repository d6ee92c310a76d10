//! Built-in extraction rules for the supported supermarkets.

use tea_lovers_core::Store;

use super::{Locators, RetailerConfig};
use crate::config::ScraperConfig;

/// Search URL template and locators for one retailer.
#[must_use]
pub fn builtin(store: Store) -> RetailerConfig {
    let (url_template, container, item, name, price) = match store {
        Store::Tesco => (
            "https://www.tesco.com/groceries/en-GB/search?query={}",
            "body",
            "li",
            "a span.styled__Text-sc-1i711qa-1",
            "p.styled__StyledHeading-sc-119w3hf-2",
        ),
        Store::Asda => (
            "https://groceries.asda.com/search/{}",
            "body",
            "li.co-item--rest-in-shelf",
            "div > div > div > div > h3 > a",
            "div > div > div > div > span > strong",
        ),
        Store::Sainsburys => (
            "https://www.sainsburys.co.uk/gol-ui/SearchResults/{}",
            "ul.ln-o-grid.ln-o-grid--matrix.ln-o-grid--equal-height",
            "li.pt-grid-item",
            "article > div > div > div > div > div > div > div > h2 > a",
            "article > div > div > div > div > div > div > span",
        ),
        Store::Morrisons => (
            "https://groceries.morrisons.com/search?entry={}",
            ".fops.fops-regular.fops-shelf",
            ".fops-item",
            ".fop-title span",
            ".fop-price",
        ),
    };

    RetailerConfig {
        store,
        url_template: url_template.to_string(),
        locators: Locators {
            container: container.to_string(),
            item: item.to_string(),
            name: name.to_string(),
            price: price.to_string(),
        },
    }
}

/// The enabled retailers with any URL overrides applied.
#[must_use]
pub fn configured(config: &ScraperConfig) -> Vec<RetailerConfig> {
    config
        .retailers
        .iter()
        .map(|store| {
            let mut retailer = builtin(*store);
            if let Some(template) = config.url_overrides.get(store) {
                retailer.url_template.clone_from(template);
            }
            retailer
        })
        .collect()
}
