//! In-memory stores for tests and local development

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use crate::domain::aggregates::{GroupBuyOrder, Product};
use crate::domain::pricing::ShippingRate;
use super::{Catalog, GroupBuyStore, StoreError};

#[derive(Default)]
pub struct InMemoryGroupBuyStore { groups: RwLock<HashMap<Uuid, GroupBuyOrder>> }

impl InMemoryGroupBuyStore {
    pub fn new() -> Self { Self::default() }

    /// Every stored group for a product, in no particular order.
    pub async fn all_for_product(&self, product_id: &str) -> Vec<GroupBuyOrder> {
        self.groups.read().await.values().filter(|g| g.product_id() == product_id).cloned().collect()
    }
}

#[async_trait]
impl GroupBuyStore for InMemoryGroupBuyStore {
    async fn find(&self, group_id: Uuid) -> Result<Option<GroupBuyOrder>, StoreError> {
        Ok(self.groups.read().await.get(&group_id).cloned())
    }

    async fn find_open_for_product(&self, product_id: &str) -> Result<Option<GroupBuyOrder>, StoreError> {
        let groups = self.groups.read().await;
        Ok(groups.values().find(|g| g.product_id() == product_id && g.status().blocks_new_proposal()).cloned())
    }

    async fn insert_proposal(&self, order: &GroupBuyOrder) -> Result<GroupBuyOrder, StoreError> {
        let mut groups = self.groups.write().await;
        if let Some(existing) = groups.values().find(|g| g.product_id() == order.product_id() && g.status().blocks_new_proposal()) {
            return Err(StoreError::DuplicateOpenGroup(existing.group_id()));
        }
        let mut stored = order.clone();
        stored.take_events();
        stored.set_version(1);
        groups.insert(stored.group_id(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, order: &GroupBuyOrder) -> Result<GroupBuyOrder, StoreError> {
        let mut groups = self.groups.write().await;
        let current = groups.get(&order.group_id()).ok_or(StoreError::NotFound(order.group_id()))?;
        if current.version() != order.version() {
            return Err(StoreError::VersionConflict { group_id: order.group_id(), expected: order.version() });
        }
        let mut stored = order.clone();
        stored.take_events();
        stored.set_version(order.version() + 1);
        groups.insert(stored.group_id(), stored.clone());
        Ok(stored)
    }
}

pub struct InMemoryCatalog {
    products: RwLock<HashMap<String, Product>>,
    shipping_rates: Vec<ShippingRate>,
}

impl InMemoryCatalog {
    pub fn new(shipping_rates: Vec<ShippingRate>) -> Self { Self { products: RwLock::new(HashMap::new()), shipping_rates } }

    pub async fn upsert(&self, product: Product) {
        self.products.write().await.insert(product.id().to_string(), product);
    }

    /// Loads products from a JSON array, returning how many were added.
    pub async fn load_json(&self, json: &str) -> Result<usize, StoreError> {
        let products: Vec<Product> = serde_json::from_str(json)?;
        let count = products.len();
        let mut map = self.products.write().await;
        for product in products {
            map.insert(product.id().to_string(), product);
        }
        Ok(count)
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self { Self::new(ShippingRate::defaults()) }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, product_id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.products.read().await.get(product_id).cloned())
    }

    async fn shipping_rate(&self, rate_id: &str) -> Result<Option<ShippingRate>, StoreError> {
        Ok(self.shipping_rates.iter().find(|r| r.id == rate_id).cloned())
    }

    async fn shipping_rates(&self) -> Result<Vec<ShippingRate>, StoreError> {
        Ok(self.shipping_rates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn product() -> Product { Product::new("P1", "Lamp", "XOF", Decimal::new(1000, 0)).with_group_buy(5, 20).unwrap() }

    #[tokio::test]
    async fn test_insert_enforces_single_open_group() {
        let store = InMemoryGroupBuyStore::new();
        let first = GroupBuyOrder::propose(&product(), "alice", 2, "m", Utc::now(), Duration::days(7)).unwrap();
        let stored = store.insert_proposal(&first).await.unwrap();
        assert_eq!(stored.version(), 1);
        assert!(stored.pending_events().is_empty());

        let second = GroupBuyOrder::propose(&product(), "bob", 2, "m", Utc::now(), Duration::days(7)).unwrap();
        match store.insert_proposal(&second).await {
            Err(StoreError::DuplicateOpenGroup(id)) => assert_eq!(id, first.group_id()),
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_is_compare_and_swap() {
        let store = InMemoryGroupBuyStore::new();
        let g = GroupBuyOrder::propose(&product(), "alice", 2, "m", Utc::now(), Duration::days(7)).unwrap();
        let stored = store.insert_proposal(&g).await.unwrap();

        let mut a = stored.clone();
        a.approve(Utc::now(), Duration::days(7)).unwrap();
        let a = store.update(&a).await.unwrap();
        assert_eq!(a.version(), 2);

        let mut stale = stored;
        stale.reject("late", Utc::now()).unwrap();
        assert!(matches!(store.update(&stale).await, Err(StoreError::VersionConflict { expected: 1, .. })));
    }

    #[tokio::test]
    async fn test_catalog_defaults() {
        let catalog = InMemoryCatalog::default();
        assert!(catalog.shipping_rate("sea").await.unwrap().is_some());
        assert!(catalog.product("P1").await.unwrap().is_none());
        catalog.upsert(product()).await;
        assert_eq!(catalog.product("P1").await.unwrap().unwrap().name(), "Lamp");
    }

    #[tokio::test]
    async fn test_catalog_loads_json() {
        let catalog = InMemoryCatalog::default();
        let json = serde_json::to_string(&vec![product()]).unwrap();
        assert_eq!(catalog.load_json(&json).await.unwrap(), 1);
        assert!(catalog.product("P1").await.unwrap().unwrap().group_buy_enabled());
        assert!(matches!(catalog.load_json("{").await, Err(StoreError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_catalog_refuses_invalid_group_buy_terms() {
        let catalog = InMemoryCatalog::default();
        let mut value = serde_json::to_value(vec![product()]).unwrap();
        value[0]["group_buy"]["min_qty"] = 0.into();
        assert!(matches!(catalog.load_json(&value.to_string()).await, Err(StoreError::Serialization(_))));
        assert!(catalog.product("P1").await.unwrap().is_none());
    }
}
