//! Basket mutations and totals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tea_lovers_core::{Price, Store, StoreParseError, UserId};

use crate::db::{BasketStore, RepositoryError};
use crate::models::{BasketLine, NewProduct};
use crate::scraping::normalize_price;

/// A basket mutation the client got wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    UnknownStore(#[from] StoreParseError),
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("price must not exceed {}", Price::MAX)]
    PriceOutOfRange,
}

/// Raw "add item" input. Every field is optional so missing ones can be reported.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddItemForm {
    pub store: Option<String>,
    pub name: Option<String>,
    pub price: Option<String>,
    pub quantity: Option<u32>,
}

/// A validated "add item" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddItem {
    pub product: NewProduct,
    pub quantity: u32,
}

impl AddItemForm {
    /// Check required fields and normalize the price.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a missing or blank field, an unknown store,
    /// a price above [`Price::MAX`] or a zero quantity.
    pub fn validate(self) -> Result<AddItem, ValidationError> {
        let store = required(self.store.as_deref(), "store")?.parse::<Store>()?;
        let name = required(self.name.as_deref(), "name")?.to_string();
        let price = normalize_price(required(self.price.as_deref(), "price")?);
        if price > Price::MAX {
            return Err(ValidationError::PriceOutOfRange);
        }
        let quantity = self.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(ValidationError::InvalidQuantity);
        }

        Ok(AddItem {
            product: NewProduct { store, name, price },
            quantity,
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ValidationError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField(field))
}

/// Per-store subtotals and the grand total of a basket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BasketTotals {
    /// One entry per known store, zero when the store has no items.
    pub subtotals: BTreeMap<Store, Price>,
    pub total: Price,
}

/// Sum price x quantity per store and overall.
#[must_use]
pub fn aggregate(lines: &[BasketLine]) -> BasketTotals {
    let mut subtotals: BTreeMap<Store, Price> =
        Store::ALL.into_iter().map(|s| (s, Price::ZERO)).collect();

    for line in lines {
        *subtotals.entry(line.product.store).or_default() +=
            line.product.price.times(line.quantity);
    }

    let total = subtotals.values().copied().sum();
    BasketTotals { subtotals, total }
}

/// A user's basket as shown to them.
#[derive(Debug, Clone, Serialize)]
pub struct BasketView {
    pub lines: Vec<BasketLine>,
    pub totals: BasketTotals,
}

/// Load the user's basket and its totals.
///
/// # Errors
///
/// Returns `RepositoryError` if the store fails.
pub async fn basket_view<S: BasketStore>(
    baskets: &S,
    user: UserId,
) -> Result<BasketView, RepositoryError> {
    let lines = baskets.list_items(user).await?;
    let totals = aggregate(&lines);
    Ok(BasketView { lines, totals })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use tea_lovers_core::{BasketItemId, ProductId};

    use super::*;
    use crate::models::Product;

    fn line(id: i32, store: Store, pence: i64, quantity: u32) -> BasketLine {
        BasketLine {
            item_id: BasketItemId::new(id),
            product: Product {
                id: ProductId::new(id),
                store,
                name: format!("item {id}"),
                price: Price::from_pence(pence),
                created_at: Utc::now(),
            },
            quantity,
        }
    }

    #[test]
    fn test_empty_basket_is_all_zero() {
        let totals = aggregate(&[]);
        assert_eq!(totals.subtotals.len(), Store::ALL.len());
        assert!(totals.subtotals.values().all(Price::is_zero));
        assert!(totals.total.is_zero());
    }

    #[test]
    fn test_subtotals_per_store() {
        let totals = aggregate(&[line(1, Store::Tesco, 100, 2), line(2, Store::Asda, 300, 1)]);
        assert_eq!(totals.subtotals[&Store::Tesco], Price::from_pence(200));
        assert_eq!(totals.subtotals[&Store::Asda], Price::from_pence(300));
        assert_eq!(totals.subtotals[&Store::Morrisons], Price::ZERO);
        assert_eq!(totals.total, Price::from_pence(500));
    }

    #[test]
    fn test_validate_reports_missing_field() {
        let form = AddItemForm {
            store: Some("Tesco".to_string()),
            name: Some("  ".to_string()),
            price: Some("£1.00".to_string()),
            quantity: None,
        };
        assert_eq!(form.validate().unwrap_err(), ValidationError::MissingField("name"));

        let form = AddItemForm {
            store: Some("Tesco".to_string()),
            name: Some("Tea".to_string()),
            ..AddItemForm::default()
        };
        assert_eq!(form.validate().unwrap_err(), ValidationError::MissingField("price"));
    }

    #[test]
    fn test_validate_normalizes_price() {
        let item = AddItemForm {
            store: Some("asda".to_string()),
            name: Some(" Oat Milk ".to_string()),
            price: Some("95p".to_string()),
            quantity: Some(2),
        }
        .validate()
        .unwrap();

        assert_eq!(item.product.store, Store::Asda);
        assert_eq!(item.product.name, "Oat Milk");
        assert_eq!(item.product.price, Price::from_pence(95));
        assert_eq!(item.quantity, 2);
    }

    #[test]
    fn test_validate_rejects_unknown_store_and_zero_quantity() {
        let form = AddItemForm {
            store: Some("Aldi".to_string()),
            name: Some("Tea".to_string()),
            price: Some("1.00".to_string()),
            quantity: None,
        };
        assert!(matches!(form.validate(), Err(ValidationError::UnknownStore(_))));

        let form = AddItemForm {
            store: Some("Tesco".to_string()),
            name: Some("Tea".to_string()),
            price: Some("1.00".to_string()),
            quantity: Some(0),
        };
        assert_eq!(form.validate().unwrap_err(), ValidationError::InvalidQuantity);
    }

    #[test]
    fn test_validate_rejects_price_beyond_column() {
        let form = |price: &str| AddItemForm {
            store: Some("Tesco".to_string()),
            name: Some("Tea".to_string()),
            price: Some(price.to_string()),
            quantity: None,
        };
        assert_eq!(
            form("10000000").validate().unwrap_err(),
            ValidationError::PriceOutOfRange
        );
        assert_eq!(form("999999.99").validate().unwrap().product.price, Price::MAX);
    }
}
