//! Integration tests for Tea Lovers.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tea-lovers-integration-tests
//! ```
//!
//! The tests run the refresh orchestrator, catalog view, basket and HTTP
//! routes end to end against [`MemoryStore`] and a [`ScriptedFetcher`] that
//! serves canned retailer pages. No network or database is needed.
//!
//! # Test Categories
//!
//! - `refresh_pipeline` - Fan-out, retries, deadline and upsert races
//! - `catalog_view` - Per-store and merged pagination
//! - `basket_totals` - Basket mutations and per-store totals
//! - `routes` - HTTP surface through the axum router

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use url::Url;

use tea_lovers_core::Store;
use tea_lovers_storefront::config::CatalogConfig;
use tea_lovers_storefront::db::MemoryStore;
use tea_lovers_storefront::scraping::{FetchError, Locators, PageFetcher, RetailerConfig};
use tea_lovers_storefront::services::refresh::{RefreshOrchestrator, RetryPolicy};
use tea_lovers_storefront::state::AppState;

/// What the scripted fetcher answers for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A page body.
    Html(String),
    /// An HTTP error status.
    Status(u16),
    /// A connection failure.
    Connect,
    /// Never answers.
    Hang,
    /// Panics inside the fetch.
    Panic,
}

#[derive(Debug)]
struct Script {
    queued: VecDeque<Reply>,
    fallback: Reply,
}

/// Page fetcher that serves scripted replies per URL and counts requests.
///
/// Queued replies are served first, in order; after that the fallback repeats.
/// URLs with no script get a connection failure.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `reply` for `store`'s search page for `term`.
    pub fn always(&self, store: Store, term: &str, reply: Reply) {
        self.script(store, term, Vec::new(), reply);
    }

    /// Answer `queued` in order, then `fallback` forever.
    pub fn script(&self, store: Store, term: &str, queued: Vec<Reply>, fallback: Reply) {
        lock(&self.scripts).insert(
            search_url(store, term),
            Script {
                queued: queued.into(),
                fallback,
            },
        );
    }

    /// How many times `store`'s search page for `term` was requested.
    #[must_use]
    pub fn calls(&self, store: Store, term: &str) -> u32 {
        lock(&self.calls)
            .get(&search_url(store, term))
            .copied()
            .unwrap_or_default()
    }

    fn next_reply(&self, url: &str) -> Reply {
        *lock(&self.calls).entry(url.to_string()).or_default() += 1;
        let mut scripts = lock(&self.scripts);
        match scripts.get_mut(url) {
            Some(script) => script
                .queued
                .pop_front()
                .unwrap_or_else(|| script.fallback.clone()),
            None => Reply::Connect,
        }
    }
}

impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        let reply = self.next_reply(url.as_str());
        match reply {
            Reply::Html(body) => Ok(body),
            Reply::Status(status) => Err(FetchError::Status(status)),
            Reply::Connect => Err(FetchError::Connect(format!("no route to {url}"))),
            Reply::Hang => std::future::pending().await,
            Reply::Panic => panic!("scripted fetch panic for {url}"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Retailer config pointing at a fake host, with simple locators.
#[must_use]
pub fn test_retailer(store: Store) -> RetailerConfig {
    RetailerConfig {
        store,
        url_template: format!(
            "https://{}.test/search?q={{}}",
            store.as_str().to_lowercase()
        ),
        locators: Locators {
            container: "ul.results".to_string(),
            item: "li.product".to_string(),
            name: ".name".to_string(),
            price: ".price".to_string(),
        },
    }
}

/// The URL the orchestrator requests for `store` and `term`.
#[must_use]
pub fn search_url(store: Store, term: &str) -> String {
    test_retailer(store)
        .search_url(term)
        .map(|url| url.to_string())
        .unwrap_or_default()
}

/// A results page listing `(name, price text)` pairs.
#[must_use]
pub fn results_page(products: &[(&str, &str)]) -> String {
    let items: String = products
        .iter()
        .map(|(name, price)| {
            format!(
                r#"<li class="product"><span class="name">{name}</span><p class="price">{price}</p></li>"#
            )
        })
        .collect();
    format!(r#"<html><body><ul class="results">{items}</ul></body></html>"#)
}

/// A page without the results container, as served when a retailer changes layout.
#[must_use]
pub fn unexpected_layout_page() -> String {
    r#"<html><body><div class="captcha">Are you a robot?</div></body></html>"#.to_string()
}

/// Retry policy with a near-zero backoff.
#[must_use]
pub const fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Duration::from_millis(1),
    }
}

/// Orchestrator over `stores` using the scripted fetcher and test retailers.
///
/// # Panics
///
/// Panics if the test locators fail to compile.
#[must_use]
pub fn orchestrator(
    fetcher: &Arc<ScriptedFetcher>,
    catalog: &Arc<MemoryStore>,
    stores: &[Store],
    policy: RetryPolicy,
    deadline: Duration,
) -> RefreshOrchestrator<ScriptedFetcher, MemoryStore> {
    RefreshOrchestrator::new(
        stores.iter().copied().map(test_retailer).collect(),
        Arc::clone(fetcher),
        Arc::clone(catalog),
        policy,
        deadline,
    )
    .expect("test locators compile")
}

/// Application state over all four test retailers.
#[must_use]
pub fn app_state(
    fetcher: &Arc<ScriptedFetcher>,
    catalog: &Arc<MemoryStore>,
    sizes: CatalogConfig,
) -> AppState<MemoryStore, ScriptedFetcher> {
    let refresher = orchestrator(
        fetcher,
        catalog,
        &Store::ALL,
        fast_policy(3),
        Duration::from_secs(5),
    );
    AppState::from_parts(sizes, Arc::clone(catalog), refresher)
}
