//! Service configuration from the environment

use chrono::Duration;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;
use crate::domain::aggregates::UrgencyThresholds;
use crate::domain::pricing::FeeSchedule;
use crate::domain::value_objects::Rate;
use crate::engine::EngineSettings;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    /// JSON product list seeded into the in-memory catalog.
    pub catalog_path: Option<String>,
    pub service_fee_rate: Rate,
    pub insurance_rate: Rate,
    pub group_buy_duration_days: u32,
    pub urgency: UrgencyThresholds,
    pub commit_max_retries: u32,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid { key: &'static str, value: String, reason: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let service_fee_rate = parse_rate(get("SERVICE_FEE_RATE"), "SERVICE_FEE_RATE", Decimal::new(5, 2))?;
        let insurance_rate = parse_rate(get("INSURANCE_RATE"), "INSURANCE_RATE", Decimal::new(2, 2))?;
        let almost_full_progress = parse(get("URGENCY_ALMOST_FULL"), "URGENCY_ALMOST_FULL", 0.70)?;
        let ending_soon_fraction = parse(get("URGENCY_ENDING_SOON"), "URGENCY_ENDING_SOON", 0.25)?;
        for (key, v) in [("URGENCY_ALMOST_FULL", almost_full_progress), ("URGENCY_ENDING_SOON", ending_soon_fraction)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::Invalid { key, value: v.to_string(), reason: "must be within [0, 1]".into() });
            }
        }
        let group_buy_duration_days = parse(get("GROUP_BUY_DURATION_DAYS"), "GROUP_BUY_DURATION_DAYS", 14u32)?;
        if group_buy_duration_days == 0 {
            return Err(ConfigError::Invalid { key: "GROUP_BUY_DURATION_DAYS", value: "0".into(), reason: "must be at least 1".into() });
        }
        Ok(Self {
            port: parse(get("PORT"), "PORT", 8083u16)?,
            database_url: get("DATABASE_URL"),
            nats_url: get("NATS_URL"),
            catalog_path: get("CATALOG_PATH"),
            service_fee_rate,
            insurance_rate,
            group_buy_duration_days,
            urgency: UrgencyThresholds { almost_full_progress, ending_soon_fraction },
            commit_max_retries: parse(get("COMMIT_MAX_RETRIES"), "COMMIT_MAX_RETRIES", 5u32)?,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            fees: FeeSchedule { service_fee: self.service_fee_rate, insurance: self.insurance_rate },
            group_buy_duration: Duration::days(i64::from(self.group_buy_duration_days)),
            urgency: self.urgency,
            commit_max_retries: self.commit_max_retries,
        }
    }
}

fn parse<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where T::Err: std::fmt::Display {
    match raw {
        None => Ok(default),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid { key, reason: e.to_string(), value }),
        },
    }
}

fn parse_rate(raw: Option<String>, key: &'static str, default: Decimal) -> Result<Rate, ConfigError> {
    let value = parse(raw, key, default)?;
    Rate::new(value).map_err(|e| ConfigError::Invalid { key, value: value.to_string(), reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.port, 8083);
        assert!(c.database_url.is_none());
        assert_eq!(c.service_fee_rate.value(), Decimal::new(5, 2));
        assert_eq!(c.insurance_rate.value(), Decimal::new(2, 2));
        assert_eq!(c.engine_settings().group_buy_duration, Duration::days(14));
        assert_eq!(c.commit_max_retries, 5);
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let c = config(&[("PORT", "9000"), ("SERVICE_FEE_RATE", "0.1"), ("DATABASE_URL", " "), ("GROUP_BUY_DURATION_DAYS", "7")]).unwrap();
        assert_eq!(c.port, 9000);
        assert_eq!(c.service_fee_rate.value(), Decimal::new(1, 1));
        assert!(c.database_url.is_none());
        assert_eq!(c.group_buy_duration_days, 7);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(config(&[("SERVICE_FEE_RATE", "1.5")]), Err(ConfigError::Invalid { key: "SERVICE_FEE_RATE", .. })));
        assert!(matches!(config(&[("PORT", "http")]), Err(ConfigError::Invalid { key: "PORT", .. })));
        assert!(matches!(config(&[("URGENCY_ALMOST_FULL", "2")]), Err(ConfigError::Invalid { key: "URGENCY_ALMOST_FULL", .. })));
        assert!(matches!(config(&[("GROUP_BUY_DURATION_DAYS", "0")]), Err(ConfigError::Invalid { .. })));
    }
}
