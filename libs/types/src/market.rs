//! Market snapshot entities
//!
//! [`Market`] bundles the virtual AMM state of one perpetual instrument with
//! its taker fee tier. Snapshots are decoded by an account-state collaborator
//! and treated as immutable for the duration of a single simulation call.
//! Derived states (spread-adjusted reserves, post-trade curves) are returned as
//! new values by `perpsim-amm`, never written back here.

use crate::common::errors::{SimResult, SimulationError};
use crate::common::fixed_point::{SafeDivCeil, SafeMath, U192Ext, U192};
use crate::oracle::HistoricalOracleData;
use crate::precision::AMM_TIMES_PEG_TO_QUOTE_PRECISION_RATIO;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of a user position (and of the taker in a fill)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionDirection {
    #[default]
    Long,
    Short,
}

impl PositionDirection {
    pub fn opposite(self) -> Self {
        match self {
            PositionDirection::Long => PositionDirection::Short,
            PositionDirection::Short => PositionDirection::Long,
        }
    }
}

impl fmt::Display for PositionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionDirection::Long => write!(f, "long"),
            PositionDirection::Short => write!(f, "short"),
        }
    }
}

/// Whether an amount is deposited into or withdrawn from an AMM reserve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapDirection {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Base,
    Quote,
}

impl AssetType {
    /// Reserve movement caused by a user trading in `direction` with an amount of this asset
    ///
    /// A long taker removes base from the curve and adds quote; a short taker
    /// does the opposite.
    pub fn swap_direction(self, direction: PositionDirection) -> SwapDirection {
        match (self, direction) {
            (AssetType::Base, PositionDirection::Long) => SwapDirection::Remove,
            (AssetType::Base, PositionDirection::Short) => SwapDirection::Add,
            (AssetType::Quote, PositionDirection::Long) => SwapDirection::Add,
            (AssetType::Quote, PositionDirection::Short) => SwapDirection::Remove,
        }
    }
}

/// Trade amount tagged with its denomination
///
/// Base amounts use `AMM_RESERVE_PRECISION`, quote amounts `QUOTE_PRECISION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "asset", content = "amount")]
pub enum AssetAmount {
    Base(u128),
    Quote(u128),
}

impl AssetAmount {
    pub fn amount(self) -> u128 {
        match self {
            AssetAmount::Base(amount) | AssetAmount::Quote(amount) => amount,
        }
    }

    pub fn asset_type(self) -> AssetType {
        match self {
            AssetAmount::Base(_) => AssetType::Base,
            AssetAmount::Quote(_) => AssetType::Quote,
        }
    }

    pub fn is_zero(self) -> bool {
        self.amount() == 0
    }

    /// Same denomination with a different magnitude
    pub fn with_amount(self, amount: u128) -> Self {
        match self {
            AssetAmount::Base(_) => AssetAmount::Base(amount),
            AssetAmount::Quote(_) => AssetAmount::Quote(amount),
        }
    }

    /// Amount expressed in the units of the matching AMM reserve
    ///
    /// Quote amounts are rescaled by the peg. When quote is withdrawn from the
    /// curve an inexact rescale rounds up so the user never receives more than
    /// the curve gives up; deposits truncate.
    pub fn to_reserve_amount(self, peg_multiplier: u128, direction: SwapDirection) -> SimResult<u128> {
        match self {
            AssetAmount::Base(amount) => Ok(amount),
            AssetAmount::Quote(amount) => {
                if peg_multiplier == 0 {
                    return Err(SimulationError::NonPositiveReserve {
                        field: "peg_multiplier",
                    });
                }
                let scaled = U192::from(amount)
                    .safe_mul(U192::from(AMM_TIMES_PEG_TO_QUOTE_PRECISION_RATIO))?;
                let peg = U192::from(peg_multiplier);
                match direction {
                    SwapDirection::Remove => scaled.safe_div_ceil(peg)?.try_to_u128(),
                    SwapDirection::Add => scaled.safe_div(peg)?.try_to_u128(),
                }
            }
        }
    }
}

/// Virtual AMM state of a perpetual market
///
/// Signed position fields follow the venue convention: positive means users
/// are net long against the AMM.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Amm {
    // Curve
    pub base_asset_reserve: u128,
    pub quote_asset_reserve: u128,
    pub sqrt_k: u128,
    pub peg_multiplier: u128,
    pub terminal_quote_asset_reserve: u128,
    pub min_base_asset_reserve: u128,
    pub max_base_asset_reserve: u128,
    pub order_step_size: u128,

    // Positions
    pub base_asset_amount_with_amm: i128,
    pub base_asset_amount_long: i128,
    pub base_asset_amount_short: i128,

    // Spread configuration and inputs
    pub base_spread: u32,
    pub max_spread: u32,
    pub last_oracle_reserve_price_spread_pct: i128,
    pub last_oracle_conf_pct: u128,
    pub mark_std: u128,
    pub oracle_std: u128,
    pub long_intensity_volume: u128,
    pub short_intensity_volume: u128,
    pub volume_24h: u128,

    // Fee and revenue accumulators
    pub total_exchange_fee: u128,
    pub total_fee_minus_distributions: i128,
    pub net_revenue_since_last_funding: i128,

    // TWAP history
    pub last_mark_price_twap: u128,
    pub last_mark_price_twap_5min: u128,
    /// Zero falls back to `last_mark_price_twap`
    pub last_bid_price_twap: u128,
    pub last_ask_price_twap: u128,
    pub last_mark_price_twap_ts: i64,
    pub historical_oracle_data: HistoricalOracleData,

    // Funding
    pub funding_period: i64,
    pub last_funding_rate_ts: i64,
    pub cumulative_funding_rate_long: i128,
    pub cumulative_funding_rate_short: i128,
}

/// Taker fee as a rational fraction of the quote amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTier {
    pub fee_numerator: u128,
    pub fee_denominator: u128,
}

impl Default for FeeTier {
    /// 10 bps
    fn default() -> Self {
        Self {
            fee_numerator: 1,
            fee_denominator: 1_000,
        }
    }
}

/// One tradable perpetual instrument
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Market {
    pub market_index: u16,
    pub amm: Amm,
    #[serde(default)]
    pub fee_tier: FeeTier,
}

impl Market {
    /// Reject snapshots the curve math cannot operate on
    pub fn validate(&self) -> SimResult<()> {
        let amm = &self.amm;
        for (field, value) in [
            ("base_asset_reserve", amm.base_asset_reserve),
            ("quote_asset_reserve", amm.quote_asset_reserve),
            ("sqrt_k", amm.sqrt_k),
            ("peg_multiplier", amm.peg_multiplier),
        ] {
            if value == 0 {
                return Err(SimulationError::NonPositiveReserve { field });
            }
        }

        if amm.min_base_asset_reserve == 0 || amm.min_base_asset_reserve > amm.max_base_asset_reserve {
            return Err(SimulationError::invalid_argument(format!(
                "market {} has invalid base reserve bounds [{}, {}]",
                self.market_index, amm.min_base_asset_reserve, amm.max_base_asset_reserve
            )));
        }

        if self.fee_tier.fee_denominator == 0 {
            return Err(SimulationError::invalid_argument(format!(
                "market {} has a zero fee denominator",
                self.market_index
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::reference_market;
    use crate::precision::QUOTE_PRECISION;

    #[test]
    fn test_swap_direction_table() {
        assert_eq!(
            AssetType::Base.swap_direction(PositionDirection::Long),
            SwapDirection::Remove
        );
        assert_eq!(
            AssetType::Base.swap_direction(PositionDirection::Short),
            SwapDirection::Add
        );
        assert_eq!(
            AssetType::Quote.swap_direction(PositionDirection::Long),
            SwapDirection::Add
        );
        assert_eq!(
            AssetType::Quote.swap_direction(PositionDirection::Short),
            SwapDirection::Remove
        );
        assert_eq!(PositionDirection::Long.opposite(), PositionDirection::Short);
    }

    #[test]
    fn test_quote_rescale_rounds_up_only_on_remove() {
        // 1 quote unit at peg 3.000 -> 10^10 / 3000, inexact
        let amount = AssetAmount::Quote(1);
        assert_eq!(amount.to_reserve_amount(3_000, SwapDirection::Add).unwrap(), 3_333_333);
        assert_eq!(
            amount.to_reserve_amount(3_000, SwapDirection::Remove).unwrap(),
            3_333_334
        );

        // exact rescale is identical in both directions
        let exact = AssetAmount::Quote(49_750 * QUOTE_PRECISION / 1_000);
        assert_eq!(
            exact.to_reserve_amount(1_000, SwapDirection::Add).unwrap(),
            exact.to_reserve_amount(1_000, SwapDirection::Remove).unwrap()
        );

        assert_eq!(
            AssetAmount::Base(7).to_reserve_amount(3_000, SwapDirection::Remove).unwrap(),
            7
        );
        assert!(AssetAmount::Quote(1).to_reserve_amount(0, SwapDirection::Add).is_err());
    }

    #[test]
    fn test_validate_rejects_degenerate_snapshots() {
        let market = reference_market();
        assert!(market.validate().is_ok());

        let mut zero_peg = market.clone();
        zero_peg.amm.peg_multiplier = 0;
        assert_eq!(
            zero_peg.validate().unwrap_err(),
            SimulationError::NonPositiveReserve {
                field: "peg_multiplier"
            }
        );

        let mut inverted = market.clone();
        inverted.amm.min_base_asset_reserve = inverted.amm.max_base_asset_reserve + 1;
        assert!(matches!(
            inverted.validate(),
            Err(SimulationError::InvalidArgument { .. })
        ));

        let mut no_fee = market;
        no_fee.fee_tier.fee_denominator = 0;
        assert!(no_fee.validate().is_err());
    }

    #[test]
    fn test_asset_amount_serializes_as_tagged_union() {
        let json = serde_json::to_string(&AssetAmount::Quote(5)).unwrap();
        assert_eq!(json, r#"{"asset":"quote","amount":5}"#);
        let back: AssetAmount = serde_json::from_str(r#"{"asset":"base","amount":12}"#).unwrap();
        assert_eq!(back, AssetAmount::Base(12));
    }
}
