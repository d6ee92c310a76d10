//! Cross-store catalog pages over a populated catalog.

#![allow(clippy::unwrap_used)]

use tea_lovers_core::{Price, Store};
use tea_lovers_storefront::config::CatalogConfig;
use tea_lovers_storefront::db::{CatalogStore, MemoryStore};
use tea_lovers_storefront::models::NewProduct;
use tea_lovers_storefront::services::catalog::{CatalogQuery, catalog_view};

async fn seed(catalog: &MemoryStore, store: Store, names: &[&str]) {
    for (i, name) in names.iter().enumerate() {
        let pence = 100 + i64::try_from(i).unwrap();
        catalog
            .upsert_product(&NewProduct {
                store,
                name: (*name).to_string(),
                price: Price::from_pence(pence),
            })
            .await
            .unwrap();
    }
}

fn query(term: &str, stores: Option<&str>, page: u32) -> CatalogQuery {
    CatalogQuery::parse(Some(term), stores, Some(page.to_string().as_str())).unwrap()
}

#[tokio::test]
async fn test_store_without_matches_gets_empty_page() {
    let catalog = MemoryStore::new();
    seed(&catalog, Store::Tesco, &["Earl Grey 50 Bags", "Green Tea 40 Bags"]).await;
    seed(&catalog, Store::Asda, &["Semi Skimmed Milk"]).await;

    let view = catalog_view(&catalog, &query("tea", None, 1), CatalogConfig::default())
        .await
        .unwrap();

    assert_eq!(view.stores.len(), 4);
    let tesco = view.stores.iter().find(|p| p.store == Store::Tesco).unwrap();
    assert_eq!(tesco.products.len(), 2);
    assert_eq!(tesco.info.total, 2);

    for page in view.stores.iter().filter(|p| p.store != Store::Tesco) {
        assert!(page.products.is_empty());
        assert_eq!(page.info.total, 0);
        assert!(!page.info.has_next);
    }

    assert_eq!(view.merged.products.len(), 2);
}

#[tokio::test]
async fn test_each_store_pages_independently() {
    let catalog = MemoryStore::new();
    let tesco: Vec<String> = (1..=7).map(|i| format!("Tesco Tea {i}")).collect();
    let tesco_refs: Vec<&str> = tesco.iter().map(String::as_str).collect();
    seed(&catalog, Store::Tesco, &tesco_refs).await;
    seed(&catalog, Store::Morrisons, &["Morrisons Tea 1", "Morrisons Tea 2"]).await;

    let sizes = CatalogConfig {
        store_page_size: 5,
        merged_page_size: 4,
    };

    let page_two = catalog_view(&catalog, &query("tea", None, 2), sizes)
        .await
        .unwrap();

    let tesco_page = page_two
        .stores
        .iter()
        .find(|p| p.store == Store::Tesco)
        .unwrap();
    let names: Vec<_> = tesco_page.products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Tesco Tea 6", "Tesco Tea 7"]);
    assert_eq!(tesco_page.info.total_pages, 2);
    assert!(!tesco_page.info.has_next);

    // Morrisons ran out on page one
    let morrisons = page_two
        .stores
        .iter()
        .find(|p| p.store == Store::Morrisons)
        .unwrap();
    assert!(morrisons.products.is_empty());
    assert_eq!(morrisons.info.total, 2);

    // Merged: 9 matches in id order, page 2 of size 4 is rows 4..8
    assert_eq!(page_two.merged.info.total, 9);
    assert_eq!(page_two.merged.info.total_pages, 3);
    let merged: Vec<_> = page_two
        .merged
        .products
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(
        merged,
        vec!["Tesco Tea 5", "Tesco Tea 6", "Tesco Tea 7", "Morrisons Tea 1"]
    );
}

#[tokio::test]
async fn test_store_selection_limits_pages_and_merged() {
    let catalog = MemoryStore::new();
    seed(&catalog, Store::Tesco, &["Tesco Tea"]).await;
    seed(&catalog, Store::Sainsburys, &["Sainsbury's Tea"]).await;

    let view = catalog_view(
        &catalog,
        &query("TEA", Some("sainsburys"), 1),
        CatalogConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(view.stores.len(), 1);
    assert_eq!(view.stores.first().unwrap().store, Store::Sainsburys);
    assert_eq!(view.merged.info.total, 1);
    assert_eq!(
        view.merged.products.first().unwrap().name,
        "Sainsbury's Tea"
    );
}

#[tokio::test]
async fn test_wildcards_in_term_match_literally() {
    let catalog = MemoryStore::new();
    seed(&catalog, Store::Asda, &["100% Pure Orange", "Orange Squash"]).await;

    let view = catalog_view(&catalog, &query("100%", None, 1), CatalogConfig::default())
        .await
        .unwrap();

    assert_eq!(view.merged.info.total, 1);
}
