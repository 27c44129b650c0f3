//! Checkout quote: variants → tiers → shipping → fees

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;
use crate::domain::aggregates::{GroupBuyOrder, GroupBuyStatus, Product};
use super::fees::{compose_with, FeeBreakdown, FeeSchedule};
use super::shipping::{shipping_cost, ShippingCost, ShippingRate};
use super::variants::{aggregate, selected_quantity, Aggregation, VariantAggregate};
use super::PricingError;

/// Where the effective unit price came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceSource {
    BasePrice,
    ProductTier { min_qty: u32 },
    GroupBuy { group_id: Uuid, projected_qty: u32 },
}

pub struct QuoteInput<'a> {
    pub product: &'a Product,
    /// The product's group buy, if any. Only an open one affects the price.
    pub group_buy: Option<&'a GroupBuyOrder>,
    pub selections: &'a BTreeMap<String, u32>,
    pub shipping_rate: &'a ShippingRate,
    /// Used only when no variant is selected.
    pub quantity: u32,
    pub fees: &'a FeeSchedule,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub product_id: String,
    pub currency: String,
    pub unit_price: Decimal,
    pub price_source: PriceSource,
    pub items: VariantAggregate,
    pub shipping: Option<ShippingCost>,
    pub fees: FeeBreakdown,
    pub total_price: Decimal,
}

impl PriceQuote {
    /// Shipping could not be priced; the total excludes it.
    pub fn shipping_pending(&self) -> bool { self.shipping.is_none() }
}

pub fn compute_price(input: QuoteInput<'_>) -> Result<PriceQuote, PricingError> {
    let product = input.product;
    if product.requires_quote() { return Err(PricingError::QuoteRequired(product.id().to_string())); }

    let selected = selected_quantity(input.selections);
    let quantity = if selected > 0 { selected } else { input.quantity };
    if quantity == 0 { return Err(PricingError::InvalidQuantity); }

    let active_group = input.group_buy.filter(|g| g.status() == GroupBuyStatus::Open && g.product_id() == product.id());
    let (unit_price, price_source) = match active_group {
        Some(group) => (
            group.projected_unit_price(quantity),
            PriceSource::GroupBuy { group_id: group.group_id(), projected_qty: group.current_qty().saturating_add(quantity) },
        ),
        None => match product.price_tiers().winning_tier(i64::from(quantity)) {
            Some(tier) => (tier.price, PriceSource::ProductTier { min_qty: tier.min_qty }),
            None => (product.base_price(), PriceSource::BasePrice),
        },
    };

    let items = match aggregate(input.selections, product.variant_groups(), unit_price)? {
        Aggregation::Selected(items) => items,
        Aggregation::NoSelection => VariantAggregate::scalar(product.name(), quantity, unit_price),
    };

    let shipping = shipping_cost(input.shipping_rate, product.unit_weight_kg(), product.unit_volume_m3(), items.total_quantity);
    if shipping.is_none() {
        tracing::warn!(product_id = product.id(), rate = %input.shipping_rate.id, "shipping cost undetermined, quote excludes shipping");
    }

    let base_cost = items.subtotal + shipping.as_ref().map(|s| s.cost).unwrap_or(Decimal::ZERO);
    let fees = compose_with(base_cost, input.fees);
    let total_price = fees.total_with_fees;

    Ok(PriceQuote {
        product_id: product.id().to_string(),
        currency: product.currency().to_string(),
        unit_price,
        price_source,
        items,
        shipping,
        fees,
        total_price,
    })
}
