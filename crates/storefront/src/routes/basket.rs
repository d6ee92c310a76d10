//! Basket route handlers.

use axum::{
    Form, Json,
    extract::{State, rejection::FormRejection},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tea_lovers_core::BasketItemId;

use crate::db::{BasketStore, CatalogStore};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireUser;
use crate::models::BasketLine;
use crate::scraping::PageFetcher;
use crate::services::basket::{AddItemForm, BasketView, basket_view};
use crate::state::AppState;

/// Whether an add created a new line or incremented an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddStatus {
    Created,
    Updated,
}

/// Response to a successful add.
#[derive(Debug, Serialize)]
pub struct AddResponse {
    pub status: AddStatus,
    pub line: BasketLine,
}

/// Remove form.
#[derive(Debug, Deserialize)]
pub struct RemoveForm {
    pub item_id: Option<i32>,
}

/// Response to a remove or empty.
#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: u64,
}

/// Show the user's basket with per-store totals.
#[instrument(skip(state))]
pub async fn show<S, F>(
    State(state): State<AppState<S, F>>,
    RequireUser(user): RequireUser,
) -> Result<Json<BasketView>>
where
    S: CatalogStore + BasketStore,
    F: PageFetcher,
{
    Ok(Json(basket_view(state.store(), user).await?))
}

/// Add a product to the user's basket.
#[instrument(skip(state, form))]
pub async fn add<S, F>(
    State(state): State<AppState<S, F>>,
    RequireUser(user): RequireUser,
    form: std::result::Result<Form<AddItemForm>, FormRejection>,
) -> Result<Json<AddResponse>>
where
    S: CatalogStore + BasketStore,
    F: PageFetcher,
{
    let Form(form) = form.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let item = form.validate()?;

    let added = state
        .store()
        .add_item(user, &item.product, item.quantity)
        .await?;

    add_breadcrumb(
        "basket",
        "Added item",
        Some(&[
            ("store", item.product.store.as_str()),
            ("name", item.product.name.as_str()),
        ]),
    );

    let status = if added.created {
        AddStatus::Created
    } else {
        AddStatus::Updated
    };
    Ok(Json(AddResponse {
        status,
        line: added.line,
    }))
}

/// Remove one line from the user's basket.
#[instrument(skip(state, form))]
pub async fn remove<S, F>(
    State(state): State<AppState<S, F>>,
    RequireUser(user): RequireUser,
    form: std::result::Result<Form<RemoveForm>, FormRejection>,
) -> Result<Json<RemovedResponse>>
where
    S: CatalogStore + BasketStore,
    F: PageFetcher,
{
    let Form(form) = form.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let item = form
        .item_id
        .map(BasketItemId::new)
        .ok_or_else(|| AppError::BadRequest("missing required field: item_id".to_string()))?;

    if !state.store().remove_item(user, item).await? {
        return Err(AppError::NotFound(format!("basket item {item}")));
    }
    Ok(Json(RemovedResponse { removed: 1 }))
}

/// Remove every line from the user's basket.
#[instrument(skip(state))]
pub async fn empty<S, F>(
    State(state): State<AppState<S, F>>,
    RequireUser(user): RequireUser,
) -> Result<Json<RemovedResponse>>
where
    S: CatalogStore + BasketStore,
    F: PageFetcher,
{
    let removed = state.store().empty(user).await?;
    Ok(Json(RemovedResponse { removed }))
}
