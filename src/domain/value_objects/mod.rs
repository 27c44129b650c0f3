//! Value Objects for group-buy pricing

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currencies quoted without a minor unit.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &["XOF", "XAF", "JPY", "KRW", "GNF", "RWF"];

/// Money value object. Amounts are kept at full precision; rounding to the
/// currency's minor unit happens only through [`Money::rounded`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_uppercase() } }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }

    /// Number of decimal places the currency is displayed with.
    pub fn minor_units(&self) -> u32 {
        if ZERO_DECIMAL_CURRENCIES.contains(&self.currency.as_str()) { 0 } else { 2 }
    }

    /// Rounds half away from zero to the currency's smallest unit.
    pub fn rounded(&self) -> Money {
        let dp = self.minor_units();
        Money::new(self.amount.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero), &self.currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.rounded();
        write!(f, "{} {}", r.amount, r.currency)
    }
}

/// A fraction in `[0, 1]`, e.g. `0.05` for a 5% service fee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    pub fn new(value: Decimal) -> Result<Self, InvalidRateError> {
        if value < Decimal::ZERO || value > Decimal::ONE { return Err(InvalidRateError { value }); }
        Ok(Self(value))
    }
    pub fn zero() -> Self { Self(Decimal::ZERO) }
    pub fn value(&self) -> Decimal { self.0 }
    pub fn apply(&self, base: Decimal) -> Decimal { base * self.0 }
}

impl TryFrom<Decimal> for Rate {
    type Error = InvalidRateError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Rate::new(value) }
}

impl From<Rate> for Decimal { fn from(rate: Rate) -> Self { rate.0 } }

#[derive(Debug, Clone, PartialEq, Eq)] pub struct InvalidRateError { pub value: Decimal }
impl std::error::Error for InvalidRateError {}
impl fmt::Display for InvalidRateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Rate {} is outside [0, 1]", self.value) }
}
