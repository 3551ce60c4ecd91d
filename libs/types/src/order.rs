//! Resting limit orders supplied by the order-source collaborator

use crate::common::errors::{SimResult, SimulationError};
use crate::common::fixed_point::{Cast, SafeMath};
use crate::market::PositionDirection;
use crate::oracle::OraclePriceData;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque 32-byte account identity of an order owner
///
/// Only used for caller-side exclusion, e.g. skipping the taker's own orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct OwnerId(pub [u8; 32]);

impl OwnerId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for OwnerId {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut bytes).map_err(|e| {
            SimulationError::invalid_argument(format!("invalid owner id '{s}': {e}"))
        })?;
        Ok(Self(bytes))
    }
}

/// How a resting order's limit price is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPrice {
    /// Absolute limit price in `PRICE_PRECISION`
    Fixed(u128),
    /// Signed offset from the current oracle price
    OracleOffset(i128),
}

/// A limit order resting on one side of the book
///
/// `side` is the maker's direction: bids are `Long`, asks are `Short`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub order_id: u32,
    pub owner: OwnerId,
    pub side: PositionDirection,
    pub price: OrderPrice,
    pub base_asset_amount: u128,
    #[serde(default)]
    pub base_asset_amount_filled: u128,
}

impl RestingOrder {
    /// Unfilled base amount
    pub fn remaining(&self) -> u128 {
        self.base_asset_amount
            .saturating_sub(self.base_asset_amount_filled)
    }

    /// Limit price against the given oracle sample
    ///
    /// Oracle-offset orders need a positive oracle price to anchor to.
    pub fn limit_price(&self, oracle: &OraclePriceData) -> SimResult<u128> {
        let price = match self.price {
            OrderPrice::Fixed(price) => price.cast::<i128>()?,
            OrderPrice::OracleOffset(offset) => oracle.positive_price()?.cast::<i128>()?.safe_add(offset)?,
        };
        if price <= 0 {
            return Err(SimulationError::NonPositivePrice {
                field: "order_price",
                price,
            });
        }
        Ok(price.unsigned_abs())
    }
}
