//! Precision Scales and Conversions
//!
//! Every quantity in the engine is an integer scaled by one of the constants
//! below. The family reproduces the authoritative engine's fixed-point layout
//! bit for bit, so the constants must not be "modernised".
//!
//! ## Scales
//!
//! - **Price** (`PRICE_PRECISION`, 10^10): mark, oracle, bid/ask and limit prices
//! - **Base asset / AMM reserves** (`AMM_RESERVE_PRECISION`, 10^13)
//! - **Peg** (`PEG_PRECISION`, 10^3): `1_000` is a peg of 1.0
//! - **Quote asset** (`QUOTE_PRECISION`, 10^6): 6-decimal collateral
//! - **Funding rate** (`FUNDING_RATE_PRECISION`, 10^14): price × funding mantissa
//! - **Spread / percentage** (10^6): `1_000_000` is 100%
//!
//! ## Example Usage
//!
//! ```rust
//! use perpsim_types::precision::{base_to_quote, Scale, AMM_RESERVE_PRECISION, PRICE_PRECISION};
//!
//! // 2 base units at $35.50 cost 71 quote units
//! let quote = base_to_quote(2 * AMM_RESERVE_PRECISION, 355 * PRICE_PRECISION / 10).unwrap();
//! assert_eq!(Scale::Quote.to_decimal(quote as i128).unwrap().to_string(), "71.000000");
//! ```

use crate::common::errors::{SimResult, SimulationError};
use crate::common::fixed_point::{SafeMath, U192Ext, U192};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const PRICE_PRECISION: u128 = 10_000_000_000;
pub const PRICE_PRECISION_I128: i128 = PRICE_PRECISION as i128;
pub const AMM_RESERVE_PRECISION: u128 = 10_000_000_000_000;
pub const BASE_PRECISION: u128 = AMM_RESERVE_PRECISION;
pub const PEG_PRECISION: u128 = 1_000;
pub const QUOTE_PRECISION: u128 = 1_000_000;
pub const QUOTE_PRECISION_I128: i128 = QUOTE_PRECISION as i128;
pub const FUNDING_PAYMENT_PRECISION: u128 = 10_000;
pub const FUNDING_RATE_PRECISION: u128 = PRICE_PRECISION * FUNDING_PAYMENT_PRECISION;
pub const BID_ASK_SPREAD_PRECISION: u128 = 1_000_000;
pub const BID_ASK_SPREAD_PRECISION_I128: i128 = BID_ASK_SPREAD_PRECISION as i128;
pub const PERCENTAGE_PRECISION: u128 = 1_000_000;
pub const PERCENTAGE_PRECISION_I128: i128 = PERCENTAGE_PRECISION as i128;

// Ratios between scales
pub const PRICE_TO_PEG_PRECISION_RATIO: u128 = PRICE_PRECISION / PEG_PRECISION;
pub const AMM_TO_QUOTE_PRECISION_RATIO: u128 = AMM_RESERVE_PRECISION / QUOTE_PRECISION;
pub const AMM_TO_QUOTE_PRECISION_RATIO_I128: i128 = AMM_TO_QUOTE_PRECISION_RATIO as i128;
pub const PRICE_TO_QUOTE_PRECISION_RATIO: u128 = PRICE_PRECISION / QUOTE_PRECISION;
pub const AMM_TIMES_PEG_TO_QUOTE_PRECISION_RATIO: u128 =
    AMM_RESERVE_PRECISION * PEG_PRECISION / QUOTE_PRECISION;
pub const AMM_TIMES_PEG_TO_QUOTE_PRECISION_RATIO_I128: i128 =
    AMM_TIMES_PEG_TO_QUOTE_PRECISION_RATIO as i128;

// Spread model
pub const DEFAULT_LARGE_BID_ASK_FACTOR: u128 = 10 * BID_ASK_SPREAD_PRECISION;
pub const MAX_BID_ASK_INVENTORY_SKEW_FACTOR: u128 = 10 * BID_ASK_SPREAD_PRECISION;
pub const DEFAULT_REVENUE_SINCE_LAST_FUNDING_SPREAD_RETREAT: i128 = -25 * QUOTE_PRECISION_I128;

// Time
pub const ONE_HOUR: i64 = 3_600;
pub const FIVE_MINUTES: i64 = 300;
pub const TWENTY_FOUR_HOURS: i64 = 86_400;

/// Named fixed-point scale for conversions to and from [`Decimal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scale {
    Price,
    Peg,
    Base,
    Quote,
    FundingRate,
    Percentage,
    BidAskSpread,
}

impl Scale {
    pub const fn precision(self) -> u128 {
        match self {
            Scale::Price => PRICE_PRECISION,
            Scale::Peg => PEG_PRECISION,
            Scale::Base => AMM_RESERVE_PRECISION,
            Scale::Quote => QUOTE_PRECISION,
            Scale::FundingRate => FUNDING_RATE_PRECISION,
            Scale::Percentage => PERCENTAGE_PRECISION,
            Scale::BidAskSpread => BID_ASK_SPREAD_PRECISION,
        }
    }

    /// Number of decimal places represented by the scale
    pub const fn decimals(self) -> u32 {
        match self {
            Scale::Price => 10,
            Scale::Peg => 3,
            Scale::Base => 13,
            Scale::Quote => 6,
            Scale::FundingRate => 14,
            Scale::Percentage | Scale::BidAskSpread => 6,
        }
    }

    /// Exact decimal view of a raw scaled integer
    pub fn to_decimal(self, raw: i128) -> SimResult<Decimal> {
        Decimal::try_from_i128_with_scale(raw, self.decimals()).map_err(|_| {
            SimulationError::invalid_argument(format!(
                "{raw} does not fit a decimal at {self:?} scale"
            ))
        })
    }

    /// Raw scaled integer for a decimal value, truncating excess digits toward zero
    pub fn from_decimal(self, value: Decimal) -> SimResult<i128> {
        let factor = Decimal::from(self.precision() as u64);
        value
            .checked_mul(factor)
            .and_then(|scaled| scaled.trunc().to_i128())
            .ok_or_else(|| {
                SimulationError::invalid_argument(format!(
                    "{value} overflows {self:?} scale"
                ))
            })
    }

    /// Parse a human-readable decimal string ("1234.56") into the scale
    pub fn from_decimal_str(self, input: &str) -> SimResult<i128> {
        let value = Decimal::from_str(input.trim()).map_err(|_| {
            SimulationError::invalid_argument(format!("invalid decimal string '{input}'"))
        })?;
        self.from_decimal(value)
    }
}

/// Quote amount (6 decimals) paid for `base_asset_amount` at `price`
pub fn base_to_quote(base_asset_amount: u128, price: u128) -> SimResult<u128> {
    U192::from(base_asset_amount)
        .safe_mul(U192::from(price))?
        .safe_div(U192::from(AMM_TO_QUOTE_PRECISION_RATIO * PRICE_PRECISION))?
        .try_to_u128()
}

/// Base amount bought with `quote_asset_amount` at `price`
pub fn quote_to_base(quote_asset_amount: u128, price: u128) -> SimResult<u128> {
    if price == 0 {
        return Err(SimulationError::NonPositivePrice {
            field: "price",
            price: 0,
        });
    }
    U192::from(quote_asset_amount)
        .safe_mul(U192::from(AMM_TO_QUOTE_PRECISION_RATIO * PRICE_PRECISION))?
        .safe_div(U192::from(price))?
        .try_to_u128()
}

/// Average price of a fill; zero when nothing was filled
pub fn calculate_entry_price(quote_asset_amount: u128, base_asset_amount: u128) -> SimResult<u128> {
    if base_asset_amount == 0 {
        return Ok(0);
    }
    U192::from(quote_asset_amount)
        .safe_mul(U192::from(AMM_TO_QUOTE_PRECISION_RATIO * PRICE_PRECISION))?
        .safe_div(U192::from(base_asset_amount))?
        .try_to_u128()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_derived_ratios_match_legacy_layout() {
        assert_eq!(PRICE_TO_PEG_PRECISION_RATIO, 10_000_000);
        assert_eq!(AMM_TO_QUOTE_PRECISION_RATIO, 10_000_000);
        assert_eq!(PRICE_TO_QUOTE_PRECISION_RATIO, 10_000);
        assert_eq!(AMM_TIMES_PEG_TO_QUOTE_PRECISION_RATIO, 10_000_000_000);
        assert_eq!(FUNDING_RATE_PRECISION, 100_000_000_000_000);
    }

    #[test]
    fn test_decimal_round_trip_is_exact_at_scale() {
        let raw = Scale::Price.from_decimal(dec!(1234.5678901234)).unwrap();
        assert_eq!(raw, 12_345_678_901_234);
        assert_eq!(Scale::Price.to_decimal(raw).unwrap(), dec!(1234.5678901234));
    }

    #[test]
    fn test_from_decimal_truncates_extra_digits() {
        assert_eq!(Scale::Quote.from_decimal(dec!(1.0000009)).unwrap(), 1_000_000);
        assert_eq!(Scale::Quote.from_decimal(dec!(-1.0000009)).unwrap(), -1_000_000);
        assert_eq!(Scale::Peg.from_decimal_str(" 1.5 ").unwrap(), 1_500);
        assert!(Scale::Peg.from_decimal_str("one").is_err());
    }

    #[test]
    fn test_side_conversions_agree() {
        let one_coin = AMM_RESERVE_PRECISION;
        let price = 25 * PRICE_PRECISION;
        assert_eq!(base_to_quote(one_coin, price).unwrap(), 25 * QUOTE_PRECISION);
        assert_eq!(quote_to_base(25 * QUOTE_PRECISION, price).unwrap(), one_coin);
        assert_eq!(
            calculate_entry_price(25 * QUOTE_PRECISION, one_coin).unwrap(),
            price
        );
        assert_eq!(calculate_entry_price(10, 0).unwrap(), 0);
        assert!(quote_to_base(1, 0).is_err());
    }
}
