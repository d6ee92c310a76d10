//! Basket lines as read back for display and totals.

use serde::{Deserialize, Serialize};

use tea_lovers_core::BasketItemId;

use super::Product;

/// One basket item joined with the product it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketLine {
    pub item_id: BasketItemId,
    pub product: Product,
    pub quantity: u32,
}
