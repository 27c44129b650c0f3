//! Persistence seams. The engine decides; stores only load and save.

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryCatalog, InMemoryGroupBuyStore};
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::{GroupBuyOrder, Product};
use crate::domain::pricing::ShippingRate;

#[async_trait]
pub trait GroupBuyStore: Send + Sync {
    async fn find(&self, group_id: Uuid) -> Result<Option<GroupBuyOrder>, StoreError>;

    /// The product's group buy in a slot-holding state, if any.
    async fn find_open_for_product(&self, product_id: &str) -> Result<Option<GroupBuyOrder>, StoreError>;

    /// Inserts a new proposal. Fails with [`StoreError::DuplicateOpenGroup`]
    /// when another group already holds the product's slot.
    async fn insert_proposal(&self, order: &GroupBuyOrder) -> Result<GroupBuyOrder, StoreError>;

    /// Writes `order` if the stored version still equals `order.version()`,
    /// returning the stored copy with the bumped version.
    async fn update(&self, order: &GroupBuyOrder) -> Result<GroupBuyOrder, StoreError>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, product_id: &str) -> Result<Option<Product>, StoreError>;
    async fn shipping_rate(&self, rate_id: &str) -> Result<Option<ShippingRate>, StoreError>;
    async fn shipping_rates(&self) -> Result<Vec<ShippingRate>, StoreError>;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Group buy not found: {0}")]
    NotFound(Uuid),

    #[error("Group buy {group_id} changed since version {expected}")]
    VersionConflict { group_id: Uuid, expected: u64 },

    #[error("Product already has an active group buy: {0}")]
    DuplicateOpenGroup(Uuid),

    #[error("Stored record is invalid: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
