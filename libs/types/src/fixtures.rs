//! Canonical snapshots for tests across the workspace
//!
//! Enabled inside this crate's tests and for downstream crates through the
//! `test-fixtures` feature.

use crate::market::{Amm, FeeTier, Market, PositionDirection};
use crate::oracle::{HistoricalOracleData, OraclePriceData};
use crate::order::{OrderPrice, OwnerId, RestingOrder};
use crate::precision::{PEG_PRECISION, PRICE_PRECISION, QUOTE_PRECISION};

/// Timestamp at which every fixture's TWAPs were last updated
pub const SNAPSHOT_TS: i64 = 1_700_000_000;

/// Both reserves and `sqrt_k` of the fixture curve
pub const FIXTURE_RESERVE: u128 = 5_000_000_000_000_000_000;

/// Balanced $1.00 market with no spread, matching the reference trade
pub fn reference_market() -> Market {
    let price = PRICE_PRECISION;
    Market {
        market_index: 0,
        amm: Amm {
            base_asset_reserve: FIXTURE_RESERVE,
            quote_asset_reserve: FIXTURE_RESERVE,
            sqrt_k: FIXTURE_RESERVE,
            peg_multiplier: PEG_PRECISION,
            terminal_quote_asset_reserve: FIXTURE_RESERVE,
            min_base_asset_reserve: FIXTURE_RESERVE / 2,
            max_base_asset_reserve: FIXTURE_RESERVE * 2,
            order_step_size: 1,
            total_fee_minus_distributions: 1_000 * QUOTE_PRECISION as i128,
            last_mark_price_twap: price,
            last_mark_price_twap_5min: price,
            last_bid_price_twap: price,
            last_ask_price_twap: price,
            last_mark_price_twap_ts: SNAPSHOT_TS,
            historical_oracle_data: HistoricalOracleData {
                last_oracle_price: price as i128,
                last_oracle_price_twap: price as i128,
                last_oracle_price_twap_5min: price as i128,
                last_oracle_price_twap_ts: SNAPSHOT_TS,
                ..Default::default()
            },
            funding_period: 3_600,
            last_funding_rate_ts: SNAPSHOT_TS,
            ..Default::default()
        },
        fee_tier: FeeTier::default(),
    }
}

/// Reference market quoting a 10 bps base spread and a 5% max spread
pub fn spread_market() -> Market {
    let mut market = reference_market();
    market.market_index = 1;
    market.amm.base_spread = 1_000;
    market.amm.max_spread = 50_000;
    market
}

/// Valid oracle sample with zero confidence interval
pub fn oracle_at(price: u128) -> OraclePriceData {
    OraclePriceData {
        price: price as i128,
        confidence: 0,
        delay: 0,
        slot: 1,
        has_sufficient_number_of_data_points: true,
    }
}

pub fn maker(id: u8) -> OwnerId {
    OwnerId::new([id; 32])
}

/// Ask resting at a fixed price, owned by `maker(order_id)`
pub fn ask(order_id: u32, price: u128, base_asset_amount: u128) -> RestingOrder {
    resting(order_id, PositionDirection::Short, price, base_asset_amount)
}

/// Bid resting at a fixed price, owned by `maker(order_id)`
pub fn bid(order_id: u32, price: u128, base_asset_amount: u128) -> RestingOrder {
    resting(order_id, PositionDirection::Long, price, base_asset_amount)
}

fn resting(order_id: u32, side: PositionDirection, price: u128, base_asset_amount: u128) -> RestingOrder {
    RestingOrder {
        order_id,
        owner: maker(order_id as u8),
        side,
        price: OrderPrice::Fixed(price),
        base_asset_amount,
        base_asset_amount_filled: 0,
    }
}
