//! Catalog product as seen by the pricing path

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::pricing::{TierSchedule, VariantGroup};

/// Group-buy thresholds for a product. Absent means group buys are disabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGroupBuyTerms")]
pub struct GroupBuyTerms { pub min_qty: u32, pub target_qty: u32 }

impl GroupBuyTerms {
    /// Requires `1 <= min_qty <= target_qty`.
    pub fn new(min_qty: u32, target_qty: u32) -> Result<Self, ProductError> {
        if min_qty == 0 || min_qty > target_qty { return Err(ProductError::InvalidGroupBuyTerms { min_qty, target_qty }); }
        Ok(Self { min_qty, target_qty })
    }
}

#[derive(Deserialize)]
struct RawGroupBuyTerms { min_qty: u32, target_qty: u32 }

impl TryFrom<RawGroupBuyTerms> for GroupBuyTerms {
    type Error = ProductError;
    fn try_from(raw: RawGroupBuyTerms) -> Result<Self, Self::Error> { GroupBuyTerms::new(raw.min_qty, raw.target_qty) }
}

/// Reference data owned by the catalog; read-only for the duration of a quote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    id: String,
    name: String,
    currency: String,
    base_price: Decimal,
    #[serde(default)]
    price_tiers: TierSchedule,
    #[serde(default)]
    variant_groups: Vec<VariantGroup>,
    #[serde(default)]
    unit_weight_kg: Option<f64>,
    #[serde(default)]
    unit_volume_m3: Option<f64>,
    #[serde(default)]
    requires_quote: bool,
    #[serde(default)]
    group_buy: Option<GroupBuyTerms>,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>, currency: &str, base_price: Decimal) -> Self {
        Self {
            id: id.into(), name: name.into(), currency: currency.to_uppercase(), base_price,
            price_tiers: TierSchedule::empty(), variant_groups: vec![], unit_weight_kg: None, unit_volume_m3: None,
            requires_quote: false, group_buy: None,
        }
    }

    pub fn with_tiers(mut self, tiers: TierSchedule) -> Self { self.price_tiers = tiers; self }
    pub fn with_variants(mut self, groups: Vec<VariantGroup>) -> Self { self.variant_groups = groups; self }
    pub fn with_dimensions(mut self, unit_weight_kg: Option<f64>, unit_volume_m3: Option<f64>) -> Self {
        self.unit_weight_kg = unit_weight_kg;
        self.unit_volume_m3 = unit_volume_m3;
        self
    }
    pub fn requiring_quote(mut self) -> Self { self.requires_quote = true; self }

    pub fn with_group_buy(mut self, min_qty: u32, target_qty: u32) -> Result<Self, ProductError> {
        self.group_buy = Some(GroupBuyTerms::new(min_qty, target_qty)?);
        Ok(self)
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn base_price(&self) -> Decimal { self.base_price }
    pub fn price_tiers(&self) -> &TierSchedule { &self.price_tiers }
    pub fn variant_groups(&self) -> &[VariantGroup] { &self.variant_groups }
    pub fn unit_weight_kg(&self) -> Option<f64> { self.unit_weight_kg }
    pub fn unit_volume_m3(&self) -> Option<f64> { self.unit_volume_m3 }
    pub fn requires_quote(&self) -> bool { self.requires_quote }
    pub fn group_buy_terms(&self) -> Option<GroupBuyTerms> { self.group_buy }
    pub fn group_buy_enabled(&self) -> bool { self.group_buy.is_some() }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { InvalidGroupBuyTerms { min_qty: u32, target_qty: u32 } }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidGroupBuyTerms { min_qty, target_qty } => write!(f, "Invalid group buy terms: min {min_qty}, target {target_qty}"),
        }
    }
}
