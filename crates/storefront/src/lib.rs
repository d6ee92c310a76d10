//! Tea Lovers storefront library.
//!
//! Scrapes grocery retailers' search pages into a shared catalog, serves
//! per-store and merged catalog pages, and keeps a per-user basket with
//! per-store totals.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod scraping;
pub mod services;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

use db::{BasketStore, CatalogStore};
use scraping::PageFetcher;
use state::AppState;

/// Build the application router: catalog and basket routes, request ids and
/// request tracing.
///
/// Health checks and Sentry layers are added by the binary.
pub fn app<S, F>(state: AppState<S, F>) -> Router
where
    S: CatalogStore + BasketStore,
    F: PageFetcher,
{
    Router::new()
        .merge(routes::routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(
            middleware::request_id_middleware,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                    user_id = tracing::field::Empty,
                )
            }),
        )
}
