//! Service fee and insurance composition

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::Rate;
use super::PricingError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule { pub service_fee: Rate, pub insurance: Rate }

impl Default for FeeSchedule {
    fn default() -> Self { Self { service_fee: Rate::zero(), insurance: Rate::zero() } }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub base_cost: Decimal,
    pub service_fee_amount: Decimal,
    pub insurance_amount: Decimal,
    pub total_with_fees: Decimal,
}

/// Validates both rates, then composes.
pub fn compose(base_cost: Decimal, service_fee_rate: Decimal, insurance_rate: Decimal) -> Result<FeeBreakdown, PricingError> {
    let fees = FeeSchedule { service_fee: Rate::new(service_fee_rate)?, insurance: Rate::new(insurance_rate)? };
    Ok(compose_with(base_cost, &fees))
}

pub fn compose_with(base_cost: Decimal, fees: &FeeSchedule) -> FeeBreakdown {
    let service_fee_amount = fees.service_fee.apply(base_cost);
    let insurance_amount = fees.insurance.apply(base_cost);
    FeeBreakdown { base_cost, service_fee_amount, insurance_amount, total_with_fees: base_cost + service_fee_amount + insurance_amount }
}
