//! In-process store backing tests and dry-run scrapes.
//!
//! All state sits behind one mutex. Each trait method takes the lock once, so
//! the insert-or-leave upsert is atomic exactly as the unique constraint makes
//! it in `PostgreSQL`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use tea_lovers_core::{BasketId, BasketItemId, ProductId, Store, UserId};

use super::{BasketAdd, BasketStore, CatalogStore, RepositoryError, UpsertOutcome};
use crate::models::{BasketLine, NewProduct, Product};

/// Shared in-memory catalog and baskets. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    products: Vec<Product>,
    baskets: HashMap<UserId, BasketId>,
    items: Vec<ItemRecord>,
    next_product: i32,
    next_basket: i32,
    next_item: i32,
}

#[derive(Debug, Clone, Copy)]
struct ItemRecord {
    id: BasketItemId,
    basket: BasketId,
    product: ProductId,
    quantity: u32,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored product, ordered by id.
    #[must_use]
    pub fn products(&self) -> Vec<Product> {
        self.lock().products.clone()
    }

    /// Delete every product of `store` and the basket items pointing at them.
    ///
    /// Stands in for the external bulk purge the catalog has to tolerate.
    pub fn purge_store(&self, store: Store) -> usize {
        let mut inner = self.lock();
        let before = inner.products.len();
        inner.products.retain(|p| p.store != store);
        let live: Vec<ProductId> = inner.products.iter().map(|p| p.id).collect();
        inner.items.retain(|item| live.contains(&item.product));
        before - inner.products.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn upsert(&mut self, product: &NewProduct) -> UpsertOutcome {
        if let Some(existing) = self
            .products
            .iter()
            .find(|p| p.store == product.store && p.name == product.name)
        {
            return UpsertOutcome::Existing(existing.clone());
        }

        self.next_product += 1;
        let created = Product {
            id: ProductId::new(self.next_product),
            store: product.store,
            name: product.name.clone(),
            price: product.price,
            created_at: Utc::now(),
        };
        self.products.push(created.clone());
        UpsertOutcome::Created(created)
    }

    fn matching<'a>(&'a self, stores: &'a [Store], term: &str) -> impl Iterator<Item = &'a Product> {
        let needle = term.to_lowercase();
        self.products
            .iter()
            .filter(move |p| stores.contains(&p.store) && p.name.to_lowercase().contains(&needle))
    }

    fn basket_for(&mut self, user: UserId) -> BasketId {
        if let Some(id) = self.baskets.get(&user) {
            return *id;
        }
        self.next_basket += 1;
        let id = BasketId::new(self.next_basket);
        self.baskets.insert(user, id);
        id
    }

    fn line(&self, item: &ItemRecord) -> Option<BasketLine> {
        self.products
            .iter()
            .find(|p| p.id == item.product)
            .map(|product| BasketLine {
                item_id: item.id,
                product: product.clone(),
                quantity: item.quantity,
            })
    }
}

fn slice(products: Vec<Product>, offset: u64, limit: u64) -> Vec<Product> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    products.into_iter().skip(offset).take(limit).collect()
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

impl CatalogStore for MemoryStore {
    async fn upsert_product(&self, product: &NewProduct) -> Result<UpsertOutcome, RepositoryError> {
        Ok(self.lock().upsert(product))
    }

    async fn search_store(
        &self,
        store: Store,
        term: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Product>, RepositoryError> {
        self.search_merged(&[store], term, offset, limit).await
    }

    async fn count_store(&self, store: Store, term: &str) -> Result<u64, RepositoryError> {
        self.count_merged(&[store], term).await
    }

    async fn search_merged(
        &self,
        stores: &[Store],
        term: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Product>, RepositoryError> {
        let matching: Vec<Product> = self.lock().matching(stores, term).cloned().collect();
        Ok(slice(matching, offset, limit))
    }

    async fn count_merged(&self, stores: &[Store], term: &str) -> Result<u64, RepositoryError> {
        Ok(as_count(self.lock().matching(stores, term).count()))
    }
}

impl BasketStore for MemoryStore {
    async fn add_item(
        &self,
        user: UserId,
        product: &NewProduct,
        quantity: u32,
    ) -> Result<BasketAdd, RepositoryError> {
        let mut inner = self.lock();
        let product = inner.upsert(product).into_product();
        let basket = inner.basket_for(user);

        if let Some(item) = inner
            .items
            .iter_mut()
            .find(|i| i.basket == basket && i.product == product.id)
        {
            item.quantity = item.quantity.saturating_add(quantity);
            let line = BasketLine {
                item_id: item.id,
                product,
                quantity: item.quantity,
            };
            return Ok(BasketAdd { line, created: false });
        }

        inner.next_item += 1;
        let item = ItemRecord {
            id: BasketItemId::new(inner.next_item),
            basket,
            product: product.id,
            quantity,
        };
        inner.items.push(item);

        Ok(BasketAdd {
            line: BasketLine {
                item_id: item.id,
                product,
                quantity,
            },
            created: true,
        })
    }

    async fn remove_item(&self, user: UserId, item: BasketItemId) -> Result<bool, RepositoryError> {
        let mut inner = self.lock();
        let Some(basket) = inner.baskets.get(&user).copied() else {
            return Ok(false);
        };
        let before = inner.items.len();
        inner.items.retain(|i| !(i.id == item && i.basket == basket));
        Ok(inner.items.len() < before)
    }

    async fn empty(&self, user: UserId) -> Result<u64, RepositoryError> {
        let mut inner = self.lock();
        let Some(basket) = inner.baskets.get(&user).copied() else {
            return Ok(0);
        };
        let before = inner.items.len();
        inner.items.retain(|i| i.basket != basket);
        Ok(as_count(before - inner.items.len()))
    }

    async fn list_items(&self, user: UserId) -> Result<Vec<BasketLine>, RepositoryError> {
        let inner = self.lock();
        let Some(basket) = inner.baskets.get(&user).copied() else {
            return Ok(Vec::new());
        };
        Ok(inner
            .items
            .iter()
            .filter(|i| i.basket == basket)
            .filter_map(|i| inner.line(i))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tea_lovers_core::Price;

    use super::*;

    fn tea(store: Store, pence: i64) -> NewProduct {
        NewProduct {
            store,
            name: "English Breakfast 80 Bags".to_string(),
            price: Price::from_pence(pence),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_first_write_wins() {
        let store = MemoryStore::new();

        let first = store.upsert_product(&tea(Store::Tesco, 349)).await.unwrap();
        let second = store.upsert_product(&tea(Store::Tesco, 299)).await.unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(second.product().price, Price::from_pence(349));
        assert_eq!(store.products().len(), 1);
    }

    #[tokio::test]
    async fn test_same_name_in_two_stores_is_two_rows() {
        let store = MemoryStore::new();
        store.upsert_product(&tea(Store::Tesco, 349)).await.unwrap();
        store.upsert_product(&tea(Store::Asda, 300)).await.unwrap();
        assert_eq!(store.products().len(), 2);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_substring() {
        let store = MemoryStore::new();
        store.upsert_product(&tea(Store::Tesco, 349)).await.unwrap();

        let hits = store.search_store(Store::Tesco, "BREAKFAST", 0, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(store.count_store(Store::Asda, "breakfast").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_item_twice_increments_quantity() {
        let store = MemoryStore::new();
        let user = UserId::new(1);

        let first = store.add_item(user, &tea(Store::Tesco, 100), 1).await.unwrap();
        let second = store.add_item(user, &tea(Store::Tesco, 100), 2).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.line.item_id, first.line.item_id);
        assert_eq!(second.line.quantity, 3);
    }

    #[tokio::test]
    async fn test_remove_item_only_from_own_basket() {
        let store = MemoryStore::new();
        let added = store
            .add_item(UserId::new(1), &tea(Store::Tesco, 100), 1)
            .await
            .unwrap();

        assert!(!store.remove_item(UserId::new(2), added.line.item_id).await.unwrap());
        assert!(store.remove_item(UserId::new(1), added.line.item_id).await.unwrap());
        assert!(!store.remove_item(UserId::new(1), added.line.item_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_without_basket_is_noop() {
        let store = MemoryStore::new();
        assert_eq!(store.empty(UserId::new(9)).await.unwrap(), 0);
        assert!(store.list_items(UserId::new(9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_drops_products_and_lines() {
        let store = MemoryStore::new();
        let user = UserId::new(1);
        store.add_item(user, &tea(Store::Tesco, 100), 1).await.unwrap();
        store.add_item(user, &tea(Store::Asda, 100), 1).await.unwrap();

        assert_eq!(store.purge_store(Store::Tesco), 1);
        let lines = store.list_items(user).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product.store, Store::Asda);
    }
}
