//! Oracle samples and stored oracle history

use crate::common::errors::{SimResult, SimulationError};
use serde::{Deserialize, Serialize};

/// One oracle reading as delivered by the account-state collaborator
///
/// `price` and `confidence` use `PRICE_PRECISION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OraclePriceData {
    pub price: i128,
    pub confidence: u128,
    pub delay: i64,
    pub slot: u64,
    pub has_sufficient_number_of_data_points: bool,
}

impl OraclePriceData {
    /// Sample usable for TWAP and spread updates
    pub fn is_valid(&self) -> bool {
        self.has_sufficient_number_of_data_points && self.price > 0
    }

    /// Oracle price as an unsigned price, rejecting non-positive readings
    pub fn positive_price(&self) -> SimResult<u128> {
        if self.price <= 0 {
            return Err(SimulationError::NonPositivePrice {
                field: "oracle_price",
                price: self.price,
            });
        }
        Ok(self.price.unsigned_abs())
    }
}

/// Oracle statistics persisted on the market by the authoritative engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalOracleData {
    pub last_oracle_price: i128,
    pub last_oracle_conf: u128,
    pub last_oracle_delay: i64,
    pub last_oracle_price_twap: i128,
    pub last_oracle_price_twap_5min: i128,
    pub last_oracle_price_twap_ts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_requires_data_points_and_positive_price() {
        let mut oracle = OraclePriceData {
            price: 10,
            has_sufficient_number_of_data_points: true,
            ..Default::default()
        };
        assert!(oracle.is_valid());
        assert_eq!(oracle.positive_price().unwrap(), 10);

        oracle.has_sufficient_number_of_data_points = false;
        assert!(!oracle.is_valid());

        oracle.price = -3;
        assert!(matches!(
            oracle.positive_price(),
            Err(SimulationError::NonPositivePrice { price: -3, .. })
        ));
    }
}
