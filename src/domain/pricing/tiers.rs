//! Quantity price tiers

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use super::PricingError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTier {
    pub min_qty: u32,
    #[serde(default)]
    pub max_qty: Option<u32>,
    pub price: Decimal,
    #[serde(default)]
    pub discount: Option<Decimal>,
}

impl PriceTier {
    pub fn new(min_qty: u32, price: Decimal) -> Self { Self { min_qty, max_qty: None, price, discount: None } }
}

/// Validated tier list: ascending by `min_qty`, no two tiers share a threshold.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PriceTier>", into = "Vec<PriceTier>")]
pub struct TierSchedule { tiers: Vec<PriceTier> }

impl TierSchedule {
    pub fn new(mut tiers: Vec<PriceTier>) -> Result<Self, PricingError> {
        tiers.sort_by_key(|t| t.min_qty);
        if let Some(dup) = tiers.windows(2).find(|w| w[0].min_qty == w[1].min_qty) {
            tracing::error!(min_qty = dup[0].min_qty, "rejecting tier list with duplicate thresholds");
            return Err(PricingError::DuplicateTierThreshold(dup[0].min_qty));
        }
        Ok(Self { tiers })
    }

    pub fn empty() -> Self { Self::default() }
    pub fn tiers(&self) -> &[PriceTier] { &self.tiers }
    pub fn is_empty(&self) -> bool { self.tiers.is_empty() }

    /// Tier with the largest threshold not exceeding `quantity`.
    pub fn winning_tier(&self, quantity: i64) -> Option<&PriceTier> {
        let quantity = quantity.max(1);
        self.tiers.iter().rev().find(|t| quantity >= i64::from(t.min_qty))
    }

    /// The next threshold above `quantity`, if any.
    pub fn next_tier(&self, quantity: i64) -> Option<&PriceTier> {
        let quantity = quantity.max(1);
        self.tiers.iter().find(|t| i64::from(t.min_qty) > quantity)
    }

    pub fn resolve(&self, base_price: Decimal, quantity: i64) -> Decimal {
        self.winning_tier(quantity).map(|t| t.price).unwrap_or(base_price)
    }
}

impl TryFrom<Vec<PriceTier>> for TierSchedule {
    type Error = PricingError;
    fn try_from(tiers: Vec<PriceTier>) -> Result<Self, Self::Error> { TierSchedule::new(tiers) }
}

impl From<TierSchedule> for Vec<PriceTier> { fn from(s: TierSchedule) -> Self { s.tiers } }

/// Resolves a unit price from an arbitrary, possibly unsorted tier slice.
///
/// Tiers are scanned by descending `min_qty`; the first one the quantity
/// reaches wins. Quantities below 1 are clamped to 1. Falls back to
/// `base_price` when no tier qualifies.
pub fn resolve(tiers: &[PriceTier], base_price: Decimal, quantity: i64) -> Decimal {
    let quantity = quantity.max(1);
    let mut ordered: Vec<&PriceTier> = tiers.iter().collect();
    ordered.sort_by(|a, b| b.min_qty.cmp(&a.min_qty));
    debug_assert!(ordered.windows(2).all(|w| w[0].min_qty != w[1].min_qty), "duplicate tier thresholds reached the resolver");
    ordered.into_iter().find(|t| quantity >= i64::from(t.min_qty)).map(|t| t.price).unwrap_or(base_price)
}
