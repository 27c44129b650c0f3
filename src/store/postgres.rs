//! PostgreSQL-backed stores

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;
use crate::domain::aggregates::{GroupBuyOrder, GroupBuyStatus, Product};
use crate::domain::pricing::{PriceTier, ShippingRate, TierSchedule, VariantGroup};
use super::{Catalog, GroupBuyStore, StoreError};

pub struct PgStore { pool: PgPool }

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct GroupBuyRow { status: String, version: i64, state: Json<GroupBuyOrder> }

impl GroupBuyRow {
    /// The indexed `status` column must agree with the snapshot.
    fn into_order(self) -> Result<GroupBuyOrder, StoreError> {
        let status: GroupBuyStatus = self.status.parse().map_err(StoreError::Corrupt)?;
        let version = u64::try_from(self.version).map_err(|_| StoreError::Corrupt(format!("negative version {}", self.version)))?;
        let mut order = self.state.0;
        if order.status() != status {
            return Err(StoreError::Corrupt(format!("group buy {}: status column {} disagrees with snapshot {}", order.group_id(), status, order.status())));
        }
        order.set_version(version);
        Ok(order)
    }
}

/// Column values mirrored out of the JSON snapshot for indexing.
struct Columns { current_qty: i32, version: i64 }

fn columns(order: &GroupBuyOrder) -> Result<Columns, StoreError> {
    let current_qty = i32::try_from(order.current_qty()).map_err(|_| StoreError::Corrupt(format!("current_qty {} out of range", order.current_qty())))?;
    let version = i64::try_from(order.version()).map_err(|_| StoreError::Corrupt(format!("version {} out of range", order.version())))?;
    Ok(Columns { current_qty, version })
}

#[async_trait]
impl GroupBuyStore for PgStore {
    async fn find(&self, group_id: Uuid) -> Result<Option<GroupBuyOrder>, StoreError> {
        sqlx::query_as::<_, GroupBuyRow>("SELECT status, version, state FROM group_buys WHERE group_id = $1")
            .bind(group_id).fetch_optional(&self.pool).await?
            .map(GroupBuyRow::into_order).transpose()
    }

    async fn find_open_for_product(&self, product_id: &str) -> Result<Option<GroupBuyOrder>, StoreError> {
        sqlx::query_as::<_, GroupBuyRow>("SELECT status, version, state FROM group_buys WHERE product_id = $1 AND status IN ('pending_approval', 'open', 'filled', 'ordering') LIMIT 1")
            .bind(product_id).fetch_optional(&self.pool).await?
            .map(GroupBuyRow::into_order).transpose()
    }

    async fn insert_proposal(&self, order: &GroupBuyOrder) -> Result<GroupBuyOrder, StoreError> {
        let mut stored = order.clone();
        stored.take_events();
        stored.set_version(1);
        let cols = columns(&stored)?;
        let result = sqlx::query("INSERT INTO group_buys (group_id, product_id, status, current_qty, deadline, version, state, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(stored.group_id()).bind(stored.product_id()).bind(stored.status().as_str()).bind(cols.current_qty)
            .bind(stored.deadline()).bind(cols.version).bind(Json(&stored)).bind(stored.created_at()).bind(stored.updated_at())
            .execute(&self.pool).await;
        match result {
            Ok(_) => Ok(stored),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                match self.find_open_for_product(order.product_id()).await? {
                    Some(existing) => Err(StoreError::DuplicateOpenGroup(existing.group_id())),
                    None => Err(StoreError::Database(sqlx::Error::Database(e))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, order: &GroupBuyOrder) -> Result<GroupBuyOrder, StoreError> {
        let expected = columns(order)?.version;
        let mut stored = order.clone();
        stored.take_events();
        stored.set_version(order.version() + 1);
        let cols = columns(&stored)?;
        let result = sqlx::query("UPDATE group_buys SET status = $3, current_qty = $4, deadline = $5, version = $6, state = $7, updated_at = $8 WHERE group_id = $1 AND version = $2")
            .bind(stored.group_id()).bind(expected).bind(stored.status().as_str()).bind(cols.current_qty)
            .bind(stored.deadline()).bind(cols.version).bind(Json(&stored)).bind(stored.updated_at())
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return match self.find(order.group_id()).await? {
                Some(_) => Err(StoreError::VersionConflict { group_id: order.group_id(), expected: order.version() }),
                None => Err(StoreError::NotFound(order.group_id())),
            };
        }
        Ok(stored)
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    currency: String,
    base_price: Decimal,
    price_tiers: Json<Vec<PriceTier>>,
    variant_groups: Json<Vec<VariantGroup>>,
    unit_weight_kg: Option<f64>,
    unit_volume_m3: Option<f64>,
    requires_quote: bool,
    group_buy_enabled: bool,
    group_buy_min_qty: i32,
    group_buy_target_qty: i32,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let id = row.id.clone();
        let corrupt = |detail: String| StoreError::Corrupt(format!("product {id}: {detail}"));
        let tiers = TierSchedule::new(row.price_tiers.0).map_err(|e| corrupt(e.to_string()))?;
        let mut product = Product::new(row.id, row.name, &row.currency, row.base_price)
            .with_tiers(tiers)
            .with_variants(row.variant_groups.0)
            .with_dimensions(row.unit_weight_kg, row.unit_volume_m3);
        if row.requires_quote { product = product.requiring_quote(); }
        if row.group_buy_enabled {
            let min = u32::try_from(row.group_buy_min_qty).map_err(|_| corrupt(format!("group_buy_min_qty {}", row.group_buy_min_qty)))?;
            let target = u32::try_from(row.group_buy_target_qty).map_err(|_| corrupt(format!("group_buy_target_qty {}", row.group_buy_target_qty)))?;
            product = product.with_group_buy(min, target).map_err(|e| corrupt(e.to_string()))?;
        }
        Ok(product)
    }
}

#[derive(sqlx::FromRow)]
struct ShippingRateRow { id: String, label: String, billing: String, rate: Decimal, minimum_charge: Option<Decimal>, duration_days: i32 }

impl TryFrom<ShippingRateRow> for ShippingRate {
    type Error = StoreError;

    fn try_from(row: ShippingRateRow) -> Result<Self, Self::Error> {
        let billing = row.billing.parse().map_err(StoreError::Corrupt)?;
        let duration_days = u32::try_from(row.duration_days).map_err(|_| StoreError::Corrupt(format!("shipping rate {}: duration_days {}", row.id, row.duration_days)))?;
        Ok(ShippingRate { id: row.id, label: row.label, billing, rate: row.rate, minimum_charge: row.minimum_charge, duration_days })
    }
}

const PRODUCT_COLUMNS: &str = "id, name, currency, base_price, price_tiers, variant_groups, unit_weight_kg, unit_volume_m3, requires_quote, group_buy_enabled, group_buy_min_qty, group_buy_target_qty";

#[async_trait]
impl Catalog for PgStore {
    async fn product(&self, product_id: &str) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, ProductRow>(&sql).bind(product_id).fetch_optional(&self.pool).await?
            .map(Product::try_from).transpose()
    }

    async fn shipping_rate(&self, rate_id: &str) -> Result<Option<ShippingRate>, StoreError> {
        sqlx::query_as::<_, ShippingRateRow>("SELECT id, label, billing, rate, minimum_charge, duration_days FROM shipping_rates WHERE id = $1")
            .bind(rate_id).fetch_optional(&self.pool).await?
            .map(ShippingRate::try_from).transpose()
    }

    async fn shipping_rates(&self) -> Result<Vec<ShippingRate>, StoreError> {
        sqlx::query_as::<_, ShippingRateRow>("SELECT id, label, billing, rate, minimum_charge, duration_days FROM shipping_rates ORDER BY duration_days")
            .fetch_all(&self.pool).await?
            .into_iter().map(ShippingRate::try_from).collect()
    }
}
