//! Variant selection aggregation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use super::PricingError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, alias = "price_fcfa")]
    pub price: Option<Decimal>,
    pub stock: u32,
}

/// A named axis such as "Color" or "Size".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantGroup { pub name: String, pub variants: Vec<Variant> }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VariantLine {
    pub variant_id: Option<String>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub uses_fallback_price: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VariantAggregate { pub total_quantity: u32, pub subtotal: Decimal, pub lines: Vec<VariantLine> }

impl VariantAggregate {
    /// Single implicit line used when the buyer picked no variants.
    pub fn scalar(name: &str, quantity: u32, unit_price: Decimal) -> Self {
        let line_total = unit_price * Decimal::from(quantity);
        Self {
            total_quantity: quantity,
            subtotal: line_total,
            lines: vec![VariantLine { variant_id: None, name: name.to_string(), quantity, unit_price, line_total, uses_fallback_price: true }],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Aggregation { Selected(VariantAggregate), NoSelection }

/// Sum of all non-zero selected quantities.
pub fn selected_quantity(selections: &BTreeMap<String, u32>) -> u32 {
    selections.values().fold(0u32, |acc, q| acc.saturating_add(*q))
}

/// Prices a set of `(variant id, quantity)` selections.
///
/// Zero quantities are dropped. A variant without a positive price of its
/// own is billed at `fallback_unit_price`. Selections beyond the variant's
/// stock are refused.
pub fn aggregate(selections: &BTreeMap<String, u32>, groups: &[VariantGroup], fallback_unit_price: Decimal) -> Result<Aggregation, PricingError> {
    let mut lines = Vec::new();
    for (variant_id, &quantity) in selections.iter().filter(|(_, q)| **q > 0) {
        let variant = groups.iter().flat_map(|g| g.variants.iter()).find(|v| &v.id == variant_id)
            .ok_or_else(|| PricingError::UnknownVariant(variant_id.clone()))?;
        if quantity > variant.stock {
            return Err(PricingError::InsufficientStock { variant_id: variant_id.clone(), available: variant.stock, requested: quantity });
        }
        let (unit_price, uses_fallback_price) = match variant.price {
            Some(p) if p > Decimal::ZERO => (p, false),
            _ => (fallback_unit_price, true),
        };
        lines.push(VariantLine {
            variant_id: Some(variant.id.clone()),
            name: variant.name.clone(),
            quantity,
            unit_price,
            line_total: unit_price * Decimal::from(quantity),
            uses_fallback_price,
        });
    }

    if lines.is_empty() { return Ok(Aggregation::NoSelection); }

    let total_quantity = lines.iter().map(|l| l.quantity).sum();
    let subtotal = lines.iter().map(|l| l.line_total).sum();
    Ok(Aggregation::Selected(VariantAggregate { total_quantity, subtotal, lines }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn colors() -> Vec<VariantGroup> {
        vec![VariantGroup {
            name: "Color".into(),
            variants: vec![
                Variant { id: "A".into(), name: "Red".into(), image: None, price: Some(Decimal::new(1200, 0)), stock: 10 },
                Variant { id: "B".into(), name: "Blue".into(), image: None, price: Some(Decimal::ZERO), stock: 10 },
                Variant { id: "C".into(), name: "Green".into(), image: None, price: None, stock: 0 },
            ],
        }]
    }

    #[test]
    fn test_mixed_prices_with_fallback() {
        let selections = BTreeMap::from([("A".to_string(), 2), ("B".to_string(), 3)]);
        let Aggregation::Selected(agg) = aggregate(&selections, &colors(), Decimal::new(1000, 0)).unwrap() else { panic!("expected lines") };
        assert_eq!(agg.total_quantity, 5);
        assert_eq!(agg.subtotal, Decimal::new(5400, 0));
        assert!(agg.lines.iter().find(|l| l.name == "Blue").unwrap().uses_fallback_price);
    }

    #[test]
    fn test_zero_quantities_mean_no_selection() {
        let selections = BTreeMap::from([("A".to_string(), 0), ("C".to_string(), 0)]);
        assert_eq!(aggregate(&selections, &colors(), Decimal::ONE).unwrap(), Aggregation::NoSelection);
        assert_eq!(aggregate(&BTreeMap::new(), &colors(), Decimal::ONE).unwrap(), Aggregation::NoSelection);
    }

    #[test]
    fn test_stock_guard() {
        let selections = BTreeMap::from([("C".to_string(), 1)]);
        assert!(matches!(aggregate(&selections, &colors(), Decimal::ONE), Err(PricingError::InsufficientStock { available: 0, .. })));
        let selections = BTreeMap::from([("Z".to_string(), 1)]);
        assert!(matches!(aggregate(&selections, &colors(), Decimal::ONE), Err(PricingError::UnknownVariant(_))));
    }

    #[test]
    fn test_scalar_line() {
        let agg = VariantAggregate::scalar("Kettle", 4, Decimal::new(250, 0));
        assert_eq!(agg.subtotal, Decimal::new(1000, 0));
        assert_eq!(agg.lines.len(), 1);
    }

    proptest! {
        #[test]
        fn subtotal_is_sum_of_lines(qa in 0u32..=10, qb in 0u32..=10, fallback in 1i64..10_000) {
            let selections = BTreeMap::from([("A".to_string(), qa), ("B".to_string(), qb)]);
            match aggregate(&selections, &colors(), Decimal::new(fallback, 0)).unwrap() {
                Aggregation::Selected(agg) => {
                    let expected: Decimal = agg.lines.iter().map(|l| l.unit_price * Decimal::from(l.quantity)).sum();
                    prop_assert_eq!(agg.subtotal, expected);
                    prop_assert_eq!(agg.total_quantity, qa + qb);
                }
                Aggregation::NoSelection => prop_assert_eq!(qa + qb, 0),
            }
        }
    }
}
