//! Basket repository: one basket per user, lines keyed by product.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use tea_lovers_core::{BasketId, BasketItemId, UserId};

use super::products::ProductRow;
use super::{BasketAdd, RepositoryError};
use crate::models::{BasketLine, Product};

/// Internal row type for the item upsert.
#[derive(Debug, sqlx::FromRow)]
struct ItemWriteRow {
    id: i32,
    quantity: i32,
    inserted: bool,
}

/// Internal row type for basket listings.
#[derive(Debug, sqlx::FromRow)]
struct BasketLineRow {
    item_id: i32,
    quantity: i32,
    product_id: i32,
    store: String,
    name: String,
    price: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<BasketLineRow> for BasketLine {
    type Error = RepositoryError;

    fn try_from(row: BasketLineRow) -> Result<Self, Self::Error> {
        let product = Product::try_from(ProductRow {
            id: row.product_id,
            store: row.store,
            name: row.name,
            price: row.price,
            created_at: row.created_at,
        })?;

        Ok(Self {
            item_id: BasketItemId::new(row.item_id),
            product,
            quantity: quantity_from_db(row.quantity)?,
        })
    }
}

/// Repository for basket operations.
pub struct BasketRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> BasketRepository<'a> {
    /// Create a new basket repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the user's basket id, creating the basket on first use.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create(&self, user: UserId) -> Result<BasketId, RepositoryError> {
        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO catalog.basket (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING id
            ",
        )
        .bind(user)
        .fetch_one(self.pool)
        .await?;

        Ok(BasketId::new(id))
    }

    /// Add `quantity` of an already-stored product to the user's basket.
    ///
    /// A product already in the basket has its quantity incremented.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    /// Returns `RepositoryError::Conflict` if the quantity does not fit the column.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add_item(
        &self,
        user: UserId,
        product: Product,
        quantity: u32,
    ) -> Result<BasketAdd, RepositoryError> {
        let quantity = i32::try_from(quantity)
            .map_err(|_| RepositoryError::Conflict(format!("quantity {quantity} too large")))?;
        let basket = self.get_or_create(user).await?;

        let row = sqlx::query_as::<_, ItemWriteRow>(
            r"
            INSERT INTO catalog.basket_item (basket_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (basket_id, product_id)
                DO UPDATE SET quantity = catalog.basket_item.quantity + EXCLUDED.quantity
            RETURNING id, quantity, (xmax = 0) AS inserted
            ",
        )
        .bind(basket)
        .bind(product.id)
        .bind(quantity)
        .fetch_one(self.pool)
        .await?;

        Ok(BasketAdd {
            line: BasketLine {
                item_id: BasketItemId::new(row.id),
                product,
                quantity: quantity_from_db(row.quantity)?,
            },
            created: row.inserted,
        })
    }

    /// Delete one item, but only from the user's own basket.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn remove_item(&self, user: UserId, item: BasketItemId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM catalog.basket_item bi
            USING catalog.basket b
            WHERE bi.id = $1 AND bi.basket_id = b.id AND b.user_id = $2
            ",
        )
        .bind(item)
        .bind(user)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every item in the user's basket.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn empty(&self, user: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM catalog.basket_item bi
            USING catalog.basket b
            WHERE bi.basket_id = b.id AND b.user_id = $1
            ",
        )
        .bind(user)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// The user's basket lines joined with their products, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored row is invalid.
    pub async fn list_items(&self, user: UserId) -> Result<Vec<BasketLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, BasketLineRow>(
            r"
            SELECT bi.id AS item_id, bi.quantity,
                   p.id AS product_id, p.store, p.name, p.price, p.created_at
            FROM catalog.basket_item bi
            JOIN catalog.basket b ON b.id = bi.basket_id
            JOIN catalog.product p ON p.id = bi.product_id
            WHERE b.user_id = $1
            ORDER BY bi.id
            ",
        )
        .bind(user)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(BasketLine::try_from).collect()
    }
}

fn quantity_from_db(quantity: i32) -> Result<u32, RepositoryError> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q >= 1)
        .ok_or_else(|| RepositoryError::DataCorruption(format!("invalid quantity: {quantity}")))
}
