//! Shipping cost calculation

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Billing { PerKg, PerCubicMeter }

impl Billing {
    pub fn as_str(&self) -> &'static str {
        match self { Billing::PerKg => "per_kg", Billing::PerCubicMeter => "per_cubic_meter" }
    }
    fn unit(&self) -> &'static str {
        match self { Billing::PerKg => "kg", Billing::PerCubicMeter => "m³" }
    }
}

impl FromStr for Billing {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_kg" => Ok(Billing::PerKg),
            "per_cubic_meter" => Ok(Billing::PerCubicMeter),
            other => Err(format!("unknown billing rule: {other}")),
        }
    }
}

impl fmt::Display for Billing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Billing rule for one shipping method.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    pub id: String,
    pub label: String,
    pub billing: Billing,
    pub rate: Decimal,
    #[serde(default)]
    pub minimum_charge: Option<Decimal>,
    pub duration_days: u32,
}

impl ShippingRate {
    /// Reference shipping methods used when no catalog table is configured.
    pub fn defaults() -> Vec<ShippingRate> {
        vec![
            ShippingRate { id: "air".into(), label: "Air freight".into(), billing: Billing::PerKg, rate: Decimal::new(8000, 0), minimum_charge: Some(Decimal::new(5000, 0)), duration_days: 10 },
            ShippingRate { id: "sea".into(), label: "Sea freight".into(), billing: Billing::PerCubicMeter, rate: Decimal::new(250_000, 0), minimum_charge: Some(Decimal::new(25_000, 0)), duration_days: 45 },
            ShippingRate { id: "truck".into(), label: "Road freight".into(), billing: Billing::PerKg, rate: Decimal::new(1500, 0), minimum_charge: Some(Decimal::new(10_000, 0)), duration_days: 21 },
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShippingCost {
    pub rate_id: String,
    pub cost: Decimal,
    pub raw_cost: Decimal,
    pub total_measure: Decimal,
    pub floor_applied: bool,
    pub breakdown_label: String,
}

/// Computes shipping for `quantity` units.
///
/// Returns `None` when the measure the rate bills on is unknown; the caller
/// has to ask for it. The minimum charge is a floor, never an extra fee.
/// No rounding happens here.
pub fn shipping_cost(rate: &ShippingRate, unit_weight_kg: Option<f64>, unit_volume_m3: Option<f64>, quantity: u32) -> Option<ShippingCost> {
    let unit_measure = match rate.billing {
        Billing::PerKg => unit_weight_kg,
        Billing::PerCubicMeter => unit_volume_m3,
    }?;
    let unit_measure = match Decimal::from_f64(unit_measure) {
        Some(m) if m >= Decimal::ZERO => m,
        _ => {
            tracing::warn!(rate = %rate.id, unit_measure, "unusable unit measure, shipping cost undetermined");
            return None;
        }
    };

    let total_measure = (unit_measure * Decimal::from(quantity)).normalize();
    let raw_cost = total_measure * rate.rate;
    let floor = rate.minimum_charge.unwrap_or(Decimal::ZERO);
    let floor_applied = raw_cost < floor;
    let cost = raw_cost.max(floor);

    let unit = rate.billing.unit();
    let mut breakdown_label = format!("{} {unit} × {}/{unit}", total_measure, rate.rate.normalize());
    if floor_applied {
        breakdown_label.push_str(&format!(" (minimum charge {})", floor.normalize()));
    }

    Some(ShippingCost { rate_id: rate.id.clone(), cost, raw_cost, total_measure, floor_applied, breakdown_label })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn per_kg(rate: i64, minimum: Option<i64>) -> ShippingRate {
        ShippingRate { id: "air".into(), label: "Air".into(), billing: Billing::PerKg, rate: Decimal::new(rate, 0), minimum_charge: minimum.map(|m| Decimal::new(m, 0)), duration_days: 7 }
    }

    #[test]
    fn test_minimum_charge_is_a_floor() {
        let cost = shipping_cost(&per_kg(500, Some(5000)), Some(0.5), None, 4).unwrap();
        assert_eq!(cost.raw_cost, Decimal::new(1000, 0));
        assert_eq!(cost.cost, Decimal::new(5000, 0));
        assert!(cost.floor_applied);
        assert_eq!(cost.breakdown_label, "2 kg × 500/kg (minimum charge 5000)");
    }

    #[test]
    fn test_above_floor_is_not_additive() {
        let cost = shipping_cost(&per_kg(500, Some(5000)), Some(2.5), None, 10).unwrap();
        assert_eq!(cost.cost, Decimal::new(12500, 0));
        assert!(!cost.floor_applied);
    }

    #[test]
    fn test_missing_weight_is_undetermined() {
        assert!(shipping_cost(&per_kg(500, None), None, Some(1.0), 4).is_none());
    }

    #[test]
    fn test_per_cubic_meter() {
        let sea = ShippingRate { id: "sea".into(), label: "Sea".into(), billing: Billing::PerCubicMeter, rate: Decimal::new(250_000, 0), minimum_charge: None, duration_days: 45 };
        let cost = shipping_cost(&sea, Some(3.0), Some(0.02), 10).unwrap();
        assert_eq!(cost.total_measure, Decimal::new(2, 1));
        assert_eq!(cost.cost, Decimal::new(50_000, 0));
        assert!(shipping_cost(&sea, Some(3.0), None, 10).is_none());
    }

    #[test]
    fn test_negative_measure_rejected() {
        assert!(shipping_cost(&per_kg(500, None), Some(-1.0), None, 1).is_none());
        assert!(shipping_cost(&per_kg(500, None), Some(f64::NAN), None, 1).is_none());
    }

    #[test]
    fn test_billing_round_trips_through_str() {
        assert_eq!("per_cubic_meter".parse::<Billing>(), Ok(Billing::PerCubicMeter));
        assert!("per_box".parse::<Billing>().is_err());
    }

    proptest! {
        #[test]
        fn cost_never_below_minimum(rate in 1i64..20_000, minimum in 0i64..100_000, grams in 0u32..50_000, quantity in 0u32..500) {
            let weight = f64::from(grams) / 1000.0;
            let cost = shipping_cost(&per_kg(rate, Some(minimum)), Some(weight), None, quantity).unwrap();
            prop_assert!(cost.cost >= Decimal::new(minimum, 0));
            prop_assert!(cost.cost >= cost.raw_cost);
        }
    }
}
