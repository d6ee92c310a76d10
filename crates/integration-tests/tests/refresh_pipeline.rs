//! End-to-end refresh: fan-out, retries, deadline and concurrent upserts.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tea_lovers_core::{Price, Store};
use tea_lovers_integration_tests::{
    Reply, ScriptedFetcher, fast_policy, orchestrator, results_page, test_retailer,
    unexpected_layout_page,
};
use tea_lovers_storefront::db::{CatalogStore, MemoryStore};
use tea_lovers_storefront::models::NewProduct;
use tea_lovers_storefront::scraping::RetailerScraper;
use tea_lovers_storefront::services::refresh::{AbortReason, TaskState};

fn terms(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|t| (*t).to_string()).collect()
}

#[tokio::test]
async fn test_failing_retailer_does_not_affect_siblings() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let catalog = Arc::new(MemoryStore::new());

    fetcher.always(
        Store::Tesco,
        "tea",
        Reply::Html(results_page(&[("Tesco Tea 80 Bags", "£1.50")])),
    );
    fetcher.always(
        Store::Tesco,
        "milk",
        Reply::Html(results_page(&[("Tesco Whole Milk 2L", "£1.45")])),
    );
    fetcher.always(
        Store::Asda,
        "tea",
        Reply::Html(results_page(&[("ASDA Tea Bags", "95p"), ("Yorkshire Tea", "£4.20")])),
    );
    fetcher.always(Store::Asda, "milk", Reply::Html(unexpected_layout_page()));

    let refresher = orchestrator(
        &fetcher,
        &catalog,
        &[Store::Tesco, Store::Asda],
        fast_policy(3),
        Duration::from_secs(5),
    );
    let report = refresher.refresh(&terms(&["tea", "milk"])).await;

    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.aborted(), 1);

    let failed = report.outcome(Store::Asda, "milk").unwrap();
    assert_eq!(failed.state, TaskState::Aborted);
    assert_eq!(failed.abort_reason, Some(AbortReason::Extraction));
    assert_eq!(failed.attempts, 1);
    assert_eq!(fetcher.calls(Store::Asda, "milk"), 1);

    // Outcomes come back term-major, retailer-minor
    let order: Vec<_> = report
        .outcomes
        .iter()
        .map(|o| (o.term.as_str(), o.retailer))
        .collect();
    assert_eq!(
        order,
        vec![
            ("tea", Store::Tesco),
            ("tea", Store::Asda),
            ("milk", Store::Tesco),
            ("milk", Store::Asda),
        ]
    );

    assert_eq!(report.created(), 4);
    let asda_tea = catalog.search_store(Store::Asda, "tea", 0, 10).await.unwrap();
    assert_eq!(asda_tea.len(), 2);
    assert!(
        asda_tea
            .iter()
            .any(|p| p.name == "ASDA Tea Bags" && p.price == Price::from_pence(95))
    );
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let catalog = Arc::new(MemoryStore::new());

    fetcher.script(
        Store::Sainsburys,
        "biscuits",
        vec![Reply::Status(503), Reply::Connect],
        Reply::Html(results_page(&[("Digestives 400g", "£1.00")])),
    );

    let refresher = orchestrator(
        &fetcher,
        &catalog,
        &[Store::Sainsburys],
        fast_policy(3),
        Duration::from_secs(5),
    );
    let report = refresher.refresh(&terms(&["biscuits"])).await;

    let outcome = report.outcome(Store::Sainsburys, "biscuits").unwrap();
    assert_eq!(outcome.state, TaskState::Succeeded);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.created, 1);
    assert_eq!(fetcher.calls(Store::Sainsburys, "biscuits"), 3);
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let catalog = Arc::new(MemoryStore::new());
    fetcher.always(Store::Morrisons, "tea", Reply::Status(500));

    let refresher = orchestrator(
        &fetcher,
        &catalog,
        &[Store::Morrisons],
        fast_policy(3),
        Duration::from_secs(5),
    );
    let report = refresher.refresh(&terms(&["tea"])).await;

    let outcome = report.outcome(Store::Morrisons, "tea").unwrap();
    assert_eq!(outcome.abort_reason, Some(AbortReason::RetriesExhausted));
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.error.as_deref(), Some("HTTP status 500"));
    assert_eq!(fetcher.calls(Store::Morrisons, "tea"), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let catalog = Arc::new(MemoryStore::new());
    fetcher.always(Store::Tesco, "tea", Reply::Status(404));

    let refresher = orchestrator(
        &fetcher,
        &catalog,
        &[Store::Tesco],
        fast_policy(3),
        Duration::from_secs(5),
    );
    let report = refresher.refresh(&terms(&["tea"])).await;

    let outcome = report.outcome(Store::Tesco, "tea").unwrap();
    assert_eq!(outcome.abort_reason, Some(AbortReason::NonRetryable));
    assert_eq!(outcome.attempts, 1);
    assert_eq!(fetcher.calls(Store::Tesco, "tea"), 1);
}

#[tokio::test]
async fn test_deadline_aborts_hung_tasks_only() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let catalog = Arc::new(MemoryStore::new());
    fetcher.always(Store::Tesco, "tea", Reply::Hang);
    fetcher.always(
        Store::Asda,
        "tea",
        Reply::Html(results_page(&[("ASDA Tea Bags", "95p")])),
    );

    let refresher = orchestrator(
        &fetcher,
        &catalog,
        &[Store::Tesco, Store::Asda],
        fast_policy(3),
        Duration::from_millis(200),
    );
    let report = refresher.refresh(&terms(&["tea"])).await;

    let hung = report.outcome(Store::Tesco, "tea").unwrap();
    assert_eq!(hung.state, TaskState::Aborted);
    assert_eq!(hung.abort_reason, Some(AbortReason::DeadlineExceeded));
    assert_eq!(hung.attempts, 1);

    let done = report.outcome(Store::Asda, "tea").unwrap();
    assert_eq!(done.state, TaskState::Succeeded);
    assert!(report.elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn test_panicking_task_is_reported_in_place() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let catalog = Arc::new(MemoryStore::new());
    fetcher.always(Store::Tesco, "tea", Reply::Panic);
    fetcher.always(
        Store::Asda,
        "tea",
        Reply::Html(results_page(&[("ASDA Tea Bags", "95p")])),
    );

    let refresher = orchestrator(
        &fetcher,
        &catalog,
        &[Store::Tesco, Store::Asda],
        fast_policy(3),
        Duration::from_secs(5),
    );
    let report = refresher.refresh(&terms(&["tea"])).await;

    assert_eq!(report.outcomes.len(), 2);
    let first = report.outcomes.first().unwrap();
    assert_eq!(first.retailer, Store::Tesco);
    assert_eq!(first.term, "tea");
    assert_eq!(first.state, TaskState::Aborted);
    assert_eq!(first.abort_reason, Some(AbortReason::Panicked));

    assert!(report.outcome(Store::Asda, "tea").unwrap().succeeded());
    assert_eq!(catalog.products().len(), 1);
}

#[tokio::test]
async fn test_repeat_refresh_keeps_first_price() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let catalog = Arc::new(MemoryStore::new());
    fetcher.script(
        Store::Tesco,
        "tea",
        vec![Reply::Html(results_page(&[("Tesco Tea 80 Bags", "£1.50")]))],
        Reply::Html(results_page(&[("Tesco Tea 80 Bags", "£1.75")])),
    );

    let refresher = orchestrator(
        &fetcher,
        &catalog,
        &[Store::Tesco],
        fast_policy(1),
        Duration::from_secs(5),
    );
    let first = refresher.refresh(&terms(&["tea"])).await;
    let second = refresher.refresh(&terms(&["tea"])).await;

    assert_eq!(first.created(), 1);
    assert_eq!(second.created(), 0);
    assert_eq!(second.outcome(Store::Tesco, "tea").unwrap().existing, 1);

    let products = catalog.products();
    assert_eq!(products.len(), 1);
    assert_eq!(products.first().unwrap().price, Price::from_pence(150));
}

#[tokio::test]
async fn test_concurrent_upserts_leave_one_row() {
    let catalog = Arc::new(MemoryStore::new());
    let product = NewProduct {
        store: Store::Asda,
        name: "Yorkshire Tea 80 Bags".to_string(),
        price: Price::from_pence(420),
    };

    let mut handles = Vec::new();
    for _ in 0..16 {
        let catalog = Arc::clone(&catalog);
        let product = product.clone();
        handles.push(tokio::spawn(async move {
            catalog.upsert_product(&product).await.unwrap()
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().is_created() {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(catalog.count_store(Store::Asda, "yorkshire").await.unwrap(), 1);
}

#[tokio::test]
async fn test_scraper_yields_raw_results_or_nothing() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.always(
        Store::Morrisons,
        "tea",
        Reply::Html(results_page(&[("Yorkshire  Tea\n 80 Bags", "£4.20"), ("", "£1.00")])),
    );
    fetcher.always(Store::Morrisons, "milk", Reply::Status(500));

    let scraper = RetailerScraper::new(test_retailer(Store::Morrisons), Arc::clone(&fetcher)).unwrap();

    let results = scraper.scrape("tea").await;
    assert_eq!(results.len(), 1);
    let first = results.first().unwrap();
    assert_eq!(first.store, Store::Morrisons);
    assert_eq!(first.raw_name, "Yorkshire Tea 80 Bags");
    assert_eq!(first.raw_price_text, "£4.20");

    assert!(scraper.scrape("milk").await.is_empty());
}
