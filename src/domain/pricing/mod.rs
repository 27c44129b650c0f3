//! Pure pricing calculators. Nothing here performs I/O or holds state.

pub mod fees;
pub mod quote;
pub mod shipping;
pub mod tiers;
pub mod variants;

pub use fees::{compose, compose_with, FeeBreakdown, FeeSchedule};
pub use quote::{compute_price, PriceQuote, PriceSource, QuoteInput};
pub use shipping::{shipping_cost, Billing, ShippingCost, ShippingRate};
pub use tiers::{resolve, PriceTier, TierSchedule};
pub use variants::{aggregate, Aggregation, Variant, VariantAggregate, VariantGroup, VariantLine};

use thiserror::Error;
use crate::domain::value_objects::InvalidRateError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error(transparent)]
    InvalidRate(#[from] InvalidRateError),

    #[error("Duplicate price tier threshold: {0}")]
    DuplicateTierThreshold(u32),

    #[error("Unknown variant: {0}")]
    UnknownVariant(String),

    #[error("Insufficient stock for variant {variant_id}: available {available}, requested {requested}")]
    InsufficientStock { variant_id: String, available: u32, requested: u32 },

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Product {0} is priced on quotation only")]
    QuoteRequired(String),
}
