//! Storage for the catalog and baskets.
//!
//! # Schema: `catalog`
//!
//! - `product` - One row per `(store, name)`, written only by upsert
//! - `basket` - One per user, created lazily on first mutation
//! - `basket_item` - Product references with a quantity, unique per basket
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p tea-lovers-cli -- migrate
//! ```
//!
//! # Backends
//!
//! Handlers and the refresh orchestrator are written against [`CatalogStore`]
//! and [`BasketStore`]. [`PgStore`] is the production backend; [`MemoryStore`]
//! backs tests and dry-run scrapes.

pub mod baskets;
pub mod memory;
pub mod products;

use std::future::Future;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use tea_lovers_core::{BasketItemId, Store, UserId};

use crate::models::{BasketLine, NewProduct, Product};

pub use baskets::BasketRepository;
pub use memory::MemoryStore;
pub use products::ProductRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint could not be satisfied.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Result of an insert-or-leave product write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the key; this one was inserted.
    Created(Product),
    /// A row already existed and was left untouched.
    Existing(Product),
}

impl UpsertOutcome {
    /// The stored product, whichever way it got there.
    #[must_use]
    pub const fn product(&self) -> &Product {
        match self {
            Self::Created(product) | Self::Existing(product) => product,
        }
    }

    /// Consume the outcome, returning the stored product.
    #[must_use]
    pub fn into_product(self) -> Product {
        match self {
            Self::Created(product) | Self::Existing(product) => product,
        }
    }

    /// Whether the write inserted a new row.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Result of adding a product to a basket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasketAdd {
    /// The line after the write.
    pub line: BasketLine,
    /// `true` when a new line was created, `false` when an existing one was incremented.
    pub created: bool,
}

/// Catalog reads and writes.
///
/// Term matching is a case-insensitive substring match on the product name.
/// Listings are ordered by product id.
pub trait CatalogStore: Send + Sync + 'static {
    /// Insert the product if `(store, name)` is absent, otherwise leave the stored row alone.
    ///
    /// Must be atomic: concurrent calls for one key never produce two rows.
    fn upsert_product(
        &self,
        product: &NewProduct,
    ) -> impl Future<Output = Result<UpsertOutcome, RepositoryError>> + Send;

    /// One store's products matching `term`, sliced by `offset`/`limit`.
    fn search_store(
        &self,
        store: Store,
        term: &str,
        offset: u64,
        limit: u64,
    ) -> impl Future<Output = Result<Vec<Product>, RepositoryError>> + Send;

    /// Number of one store's products matching `term`.
    fn count_store(
        &self,
        store: Store,
        term: &str,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    /// Products from any of `stores` matching `term`, sliced by `offset`/`limit`.
    fn search_merged(
        &self,
        stores: &[Store],
        term: &str,
        offset: u64,
        limit: u64,
    ) -> impl Future<Output = Result<Vec<Product>, RepositoryError>> + Send;

    /// Number of products from any of `stores` matching `term`.
    fn count_merged(
        &self,
        stores: &[Store],
        term: &str,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;
}

/// Per-user basket mutations and reads.
pub trait BasketStore: Send + Sync + 'static {
    /// Add `quantity` of a product, creating the basket and the catalog row as needed.
    fn add_item(
        &self,
        user: UserId,
        product: &NewProduct,
        quantity: u32,
    ) -> impl Future<Output = Result<BasketAdd, RepositoryError>> + Send;

    /// Delete one of the user's items. Returns `false` if no such item exists.
    fn remove_item(
        &self,
        user: UserId,
        item: BasketItemId,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Delete every item in the user's basket, returning how many went.
    fn empty(&self, user: UserId) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    /// The user's basket lines, oldest first.
    fn list_items(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<Vec<BasketLine>, RepositoryError>> + Send;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

// =============================================================================
// PostgreSQL backend
// =============================================================================

/// `PostgreSQL` implementation of both store traits.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl CatalogStore for PgStore {
    async fn upsert_product(&self, product: &NewProduct) -> Result<UpsertOutcome, RepositoryError> {
        ProductRepository::new(&self.pool).upsert(product).await
    }

    async fn search_store(
        &self,
        store: Store,
        term: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Product>, RepositoryError> {
        ProductRepository::new(&self.pool)
            .search(&[store], term, offset, limit)
            .await
    }

    async fn count_store(&self, store: Store, term: &str) -> Result<u64, RepositoryError> {
        ProductRepository::new(&self.pool).count(&[store], term).await
    }

    async fn search_merged(
        &self,
        stores: &[Store],
        term: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Product>, RepositoryError> {
        ProductRepository::new(&self.pool)
            .search(stores, term, offset, limit)
            .await
    }

    async fn count_merged(&self, stores: &[Store], term: &str) -> Result<u64, RepositoryError> {
        ProductRepository::new(&self.pool).count(stores, term).await
    }
}

impl BasketStore for PgStore {
    async fn add_item(
        &self,
        user: UserId,
        product: &NewProduct,
        quantity: u32,
    ) -> Result<BasketAdd, RepositoryError> {
        let product = ProductRepository::new(&self.pool)
            .upsert(product)
            .await?
            .into_product();
        BasketRepository::new(&self.pool)
            .add_item(user, product, quantity)
            .await
    }

    async fn remove_item(&self, user: UserId, item: BasketItemId) -> Result<bool, RepositoryError> {
        BasketRepository::new(&self.pool).remove_item(user, item).await
    }

    async fn empty(&self, user: UserId) -> Result<u64, RepositoryError> {
        BasketRepository::new(&self.pool).empty(user).await
    }

    async fn list_items(&self, user: UserId) -> Result<Vec<BasketLine>, RepositoryError> {
        BasketRepository::new(&self.pool).list_items(user).await
    }
}

/// Escape `LIKE` wildcards so `term` matches literally, then wrap it for a substring match.
#[must_use]
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Convert a `COUNT(*)` result, rejecting negatives.
fn count_to_u64(count: i64) -> Result<u64, RepositoryError> {
    u64::try_from(count)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative row count: {count}")))
}

/// Clamp a pagination bound into `BIGINT` range.
fn to_sql_bound(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_wraps_term() {
        assert_eq!(like_pattern("tea"), "%tea%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("earl_grey"), "%earl\\_grey%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_count_to_u64() {
        assert_eq!(count_to_u64(7).ok(), Some(7));
        assert!(count_to_u64(-1).is_err());
    }
}
