//! Refresh trigger handler.

use axum::{
    Form,
    extract::{State, rejection::FormRejection},
    response::Redirect,
};
use serde::Deserialize;
use tracing::instrument;

use crate::db::{BasketStore, CatalogStore};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::scraping::PageFetcher;
use crate::services::refresh::parse_terms;
use crate::state::AppState;

/// Refresh form: one or more comma-separated search terms.
#[derive(Debug, Deserialize)]
pub struct RefreshForm {
    pub search_query: Option<String>,
}

/// Scrape every retailer for every submitted term, then show the first term.
///
/// Returns only once every scrape task has finished or the refresh deadline
/// has passed.
#[instrument(skip(state, form))]
pub async fn refresh<S, F>(
    State(state): State<AppState<S, F>>,
    form: std::result::Result<Form<RefreshForm>, FormRejection>,
) -> Result<Redirect>
where
    S: CatalogStore + BasketStore,
    F: PageFetcher,
{
    let Form(form) = form.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let terms = parse_terms(form.search_query.as_deref().unwrap_or_default());
    let Some(first) = terms.first() else {
        return Err(AppError::BadRequest(
            "search_query must contain at least one term".to_string(),
        ));
    };

    let joined = terms.join(",");
    add_breadcrumb("catalog", "Refresh requested", Some(&[("terms", joined.as_str())]));

    state.refresher().refresh(&terms).await;

    Ok(Redirect::to(&format!(
        "/products?query={}",
        urlencoding::encode(first)
    )))
}
