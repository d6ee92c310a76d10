//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database ping)
//!
//! # Catalog
//! GET  /products               - Per-store and merged pages  ?query=&stores=Tesco,Asda&page=
//! POST /products/refresh       - Scrape every retailer for the submitted terms (form: search_query),
//!                                then 303 to /products?query=<first term>
//!
//! # Basket (requires x-user-id)
//! GET  /basket                 - Lines and per-store totals
//! POST /basket/add             - Add a product (form: store, name, price[, quantity])
//! POST /basket/remove          - Remove one line (form: item_id)
//! POST /basket/empty           - Remove every line
//! ```

pub mod basket;
pub mod catalog;
pub mod refresh;

use axum::{
    Router,
    routing::{get, post},
};

use crate::db::{BasketStore, CatalogStore};
use crate::middleware::refresh_rate_limiter;
use crate::scraping::PageFetcher;
use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes<S, F>() -> Router<AppState<S, F>>
where
    S: CatalogStore + BasketStore,
    F: PageFetcher,
{
    let refresh = Router::new()
        .route("/refresh", post(refresh::refresh::<S, F>))
        .layer(refresh_rate_limiter());

    Router::new()
        .route("/", get(catalog::index::<S, F>))
        .merge(refresh)
}

/// Create the basket routes router.
pub fn basket_routes<S, F>() -> Router<AppState<S, F>>
where
    S: CatalogStore + BasketStore,
    F: PageFetcher,
{
    Router::new()
        .route("/", get(basket::show::<S, F>))
        .route("/add", post(basket::add::<S, F>))
        .route("/remove", post(basket::remove::<S, F>))
        .route("/empty", post(basket::empty::<S, F>))
}

/// Create all routes for the storefront.
pub fn routes<S, F>() -> Router<AppState<S, F>>
where
    S: CatalogStore + BasketStore,
    F: PageFetcher,
{
    Router::new()
        .nest("/products", product_routes())
        .nest("/basket", basket_routes())
}
