//! Catalog listing handler.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::{BasketStore, CatalogStore};
use crate::error::{AppError, Result};
use crate::middleware::OptionalUser;
use crate::scraping::PageFetcher;
use crate::services::basket::{BasketView, basket_view};
use crate::services::catalog::{CatalogQuery, CatalogView, catalog_view};
use crate::state::AppState;

/// Query parameters for the catalog listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListingParams {
    pub query: Option<String>,
    /// Comma-separated store names.
    pub stores: Option<String>,
    pub page: Option<String>,
}

/// Catalog listing, with the caller's basket when they are signed in.
#[derive(Debug, Serialize)]
pub struct ListingResponse {
    #[serde(flatten)]
    pub catalog: CatalogView,
    pub basket: Option<BasketView>,
}

/// Show matching products per store and merged, plus the user's basket.
#[instrument(skip(state, params))]
pub async fn index<S, F>(
    State(state): State<AppState<S, F>>,
    OptionalUser(user): OptionalUser,
    Query(params): Query<ListingParams>,
) -> Result<Json<ListingResponse>>
where
    S: CatalogStore + BasketStore,
    F: PageFetcher,
{
    let query = CatalogQuery::parse(
        params.query.as_deref(),
        params.stores.as_deref(),
        params.page.as_deref(),
    )
    .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let catalog = catalog_view(state.store(), &query, state.catalog_config()).await?;

    let basket = match user {
        Some(user) => Some(basket_view(state.store(), user).await?),
        None => None,
    };

    Ok(Json(ListingResponse { catalog, basket }))
}
