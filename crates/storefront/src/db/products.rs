//! Product repository for catalog reads and the insert-or-leave upsert.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use tea_lovers_core::{Price, ProductId, Store};

use super::{RepositoryError, UpsertOutcome, count_to_u64, like_pattern, to_sql_bound};
use crate::models::{NewProduct, Product};

/// How many times an upsert is retried when its row is purged mid-flight.
const UPSERT_ATTEMPTS: u32 = 3;

/// Internal row type for `catalog.product` queries.
#[derive(Debug, sqlx::FromRow)]
pub(super) struct ProductRow {
    pub(super) id: i32,
    pub(super) store: String,
    pub(super) name: String,
    pub(super) price: Decimal,
    pub(super) created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let store = row.store.parse::<Store>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid store in database: {e}"))
        })?;

        Ok(Self {
            id: ProductId::new(row.id),
            store,
            name: row.name,
            price: Price::new(row.price),
            created_at: row.created_at,
        })
    }
}

/// Repository for catalog product operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert the product unless `(store, name)` already exists.
    ///
    /// The insert is a single `ON CONFLICT DO NOTHING` statement, so concurrent
    /// writers of one key cannot create duplicates. An existing row keeps its
    /// price. If the existing row disappears before it can be read back (an
    /// external purge), the insert is attempted again.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    /// Returns `RepositoryError::Conflict` if the key keeps vanishing between insert and read.
    #[instrument(skip(self, product), fields(store = %product.store, name = %product.name))]
    pub async fn upsert(&self, product: &NewProduct) -> Result<UpsertOutcome, RepositoryError> {
        for _ in 0..UPSERT_ATTEMPTS {
            let inserted = sqlx::query_as::<_, ProductRow>(
                r"
                INSERT INTO catalog.product (store, name, price)
                VALUES ($1, $2, $3)
                ON CONFLICT (store, name) DO NOTHING
                RETURNING id, store, name, price, created_at
                ",
            )
            .bind(product.store)
            .bind(&product.name)
            .bind(product.price)
            .fetch_optional(self.pool)
            .await?;

            if let Some(row) = inserted {
                return Ok(UpsertOutcome::Created(row.try_into()?));
            }

            let existing = sqlx::query_as::<_, ProductRow>(
                r"
                SELECT id, store, name, price, created_at
                FROM catalog.product
                WHERE store = $1 AND name = $2
                ",
            )
            .bind(product.store)
            .bind(&product.name)
            .fetch_optional(self.pool)
            .await?;

            if let Some(row) = existing {
                let stored: Product = row.try_into()?;
                if stored.price != product.price {
                    tracing::debug!(
                        stored_price = %stored.price,
                        observed_price = %product.price,
                        "Keeping first-written price"
                    );
                }
                return Ok(UpsertOutcome::Existing(stored));
            }

            tracing::debug!("Product purged between insert and read, retrying");
        }

        Err(RepositoryError::Conflict(format!(
            "product {}/{} vanished during upsert",
            product.store, product.name
        )))
    }

    /// Products from `stores` whose name contains `term`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored row is invalid.
    pub async fn search(
        &self,
        stores: &[Store],
        term: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, store, name, price, created_at
            FROM catalog.product
            WHERE store = ANY($1) AND name ILIKE $2 ESCAPE '\'
            ORDER BY id
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(store_names(stores))
        .bind(like_pattern(term))
        .bind(to_sql_bound(limit))
        .bind(to_sql_bound(offset))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Number of products from `stores` whose name contains `term`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, stores: &[Store], term: &str) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM catalog.product
            WHERE store = ANY($1) AND name ILIKE $2 ESCAPE '\'
            ",
        )
        .bind(store_names(stores))
        .bind(like_pattern(term))
        .fetch_one(self.pool)
        .await?;

        count_to_u64(count)
    }
}

/// Store names as bound to a `TEXT[]` parameter.
fn store_names(stores: &[Store]) -> Vec<String> {
    stores.iter().map(|s| s.as_str().to_owned()).collect()
}
