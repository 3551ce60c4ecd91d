//! L2 depth from the vAMM curve and the resting-order book
//!
//! The vAMM side is cut into discrete levels along the spread-adjusted curve:
//! the first levels swap fixed top-of-book quote amounts so depth near the
//! touch is fine-grained, the rest split the remaining open liquidity evenly.
//! Resting orders are aggregated per price and both sources are merged in
//! price priority with equal prices combined.

use crate::cursor::OrderCursor;
use perpsim_amm::{
    calculate_market_open_bids_asks, calculate_updated_amm_spread_reserves, get_swap_direction,
};
use perpsim_config::L2Settings;
use perpsim_types::{
    calculate_entry_price, AssetAmount, AssetType, Market, OraclePriceData, OwnerId,
    PositionDirection, RestingOrder, SafeDivCeil, SimResult, SimulationError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::trace;

/// Side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    /// Direction of the taker that consumes this side
    pub fn taker_direction(self) -> PositionDirection {
        match self {
            BookSide::Bid => PositionDirection::Short,
            BookSide::Ask => PositionDirection::Long,
        }
    }

    fn is_better(self, price: u128, than: u128) -> bool {
        match self {
            BookSide::Bid => price > than,
            BookSide::Ask => price < than,
        }
    }
}

/// Base contributed to a level by each source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquiditySources {
    pub amm: u128,
    pub dlob: u128,
}

/// Aggregated depth at one price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Level {
    /// `PRICE_PRECISION`
    pub price: u128,
    /// Base, `BASE_PRECISION`
    pub size: u128,
    pub sources: LiquiditySources,
}

impl L2Level {
    fn absorb(&mut self, other: &L2Level) {
        self.size += other.size;
        self.sources.amm += other.sources.amm;
        self.sources.dlob += other.sources.dlob;
    }
}

/// Append to best-first `levels`, combining equal prices; false once a new
/// price would exceed `depth`
fn push_level(levels: &mut Vec<L2Level>, level: L2Level, depth: usize) -> bool {
    if let Some(last) = levels.last_mut() {
        if last.price == level.price {
            last.absorb(&level);
            return true;
        }
    }
    if levels.len() == depth {
        return false;
    }
    levels.push(level);
    true
}

/// Both sides, best level first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2OrderBook {
    pub bids: Vec<L2Level>,
    pub asks: Vec<L2Level>,
}

impl L2OrderBook {
    pub fn best_bid(&self) -> Option<&L2Level> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&L2Level> {
        self.asks.first()
    }
}

/// vAMM level generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VammL2Params {
    pub num_levels: usize,
    /// `QUOTE_PRECISION` amounts swapped for the first levels, best first
    pub top_of_book_quote_amounts: Vec<u128>,
}

impl TryFrom<&L2Settings> for VammL2Params {
    type Error = SimulationError;

    fn try_from(settings: &L2Settings) -> SimResult<Self> {
        Ok(Self {
            num_levels: settings.num_vamm_levels,
            top_of_book_quote_amounts: settings.top_of_book_quote_amounts_raw()?,
        })
    }
}

/// Full book construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2BookParams {
    /// Maximum levels per side
    pub depth: usize,
    pub vamm: VammL2Params,
    /// Bucket width in `PRICE_PRECISION`
    pub grouping_tick: Option<u128>,
}

impl TryFrom<&L2Settings> for L2BookParams {
    type Error = SimulationError;

    fn try_from(settings: &L2Settings) -> SimResult<Self> {
        Ok(Self {
            depth: settings.depth,
            vamm: VammL2Params::try_from(settings)?,
            grouping_tick: settings.grouping_tick_raw()?,
        })
    }
}

/// Depth the vAMM offers on `side`, best level first
///
/// Each level's price is the average price of its own slice of the curve.
/// Levels stop early once the AMM's open liquidity on that side is used up;
/// a checkpoint larger than what is left becomes one final level of the
/// remaining base.
pub fn vamm_l2_levels(
    market: &Market,
    oracle: &OraclePriceData,
    now: i64,
    side: BookSide,
    params: &VammL2Params,
) -> SimResult<Vec<L2Level>> {
    let direction = side.taker_direction();
    let amm = &market.amm;

    let mut curve = calculate_updated_amm_spread_reserves(market, direction, oracle, now)?;
    let (open_bids, open_asks) = calculate_market_open_bids_asks(
        curve.base_asset_reserve,
        amm.min_base_asset_reserve,
        amm.max_base_asset_reserve,
        amm.order_step_size,
    )?;
    let open_liquidity = match side {
        BookSide::Bid => open_bids,
        BookSide::Ask => open_asks,
    };

    let base_direction = get_swap_direction(AssetType::Base, direction);
    let quote_direction = get_swap_direction(AssetType::Quote, direction);

    let mut levels = Vec::with_capacity(params.num_levels);
    let mut consumed = 0u128;
    let mut uniform_size = None;

    for index in 0..params.num_levels {
        let remaining = open_liquidity - consumed;
        if remaining == 0 {
            break;
        }

        let swap = match params.top_of_book_quote_amounts.get(index) {
            Some(&quote) => match curve.swap(AssetAmount::Quote(quote), quote_direction) {
                Ok(swap) if swap.base_asset_amount <= remaining => swap,
                Ok(_) | Err(SimulationError::ReserveExhausted { .. }) => {
                    curve.swap(AssetAmount::Base(remaining), base_direction)?
                }
                Err(err) => return Err(err),
            },
            None => {
                let size = *uniform_size
                    .get_or_insert(remaining / (params.num_levels - index) as u128);
                curve.swap(AssetAmount::Base(size.min(remaining)), base_direction)?
            }
        };
        if swap.base_asset_amount == 0 {
            break;
        }

        let price = calculate_entry_price(swap.quote_asset_amount, swap.base_asset_amount)?;
        trace!(?side, index, price, size = swap.base_asset_amount, "vAMM level");

        consumed += swap.base_asset_amount;
        curve = swap.curve;
        levels.push(L2Level {
            price,
            size: swap.base_asset_amount,
            sources: LiquiditySources {
                amm: swap.base_asset_amount,
                dlob: 0,
            },
        });
    }

    Ok(levels)
}

/// Resting orders on `side` aggregated per price, at most `depth` levels
pub fn resting_order_levels<I>(
    orders: I,
    oracle: &OraclePriceData,
    side: BookSide,
    excluded: &HashSet<OwnerId>,
    depth: usize,
) -> SimResult<Vec<L2Level>>
where
    I: IntoIterator<Item = RestingOrder>,
{
    let mut cursor = OrderCursor::new(orders, side.taker_direction(), oracle, excluded);
    let mut levels: Vec<L2Level> = Vec::new();

    while let Some(order) = cursor.peek()? {
        cursor.consume(order.remaining)?;
        let level = L2Level {
            price: order.price,
            size: order.remaining,
            sources: LiquiditySources {
                amm: 0,
                dlob: order.remaining,
            },
        };

        if !push_level(&mut levels, level, depth) {
            break;
        }
    }

    Ok(levels)
}

/// Merge two best-first level lists for `side`, combining equal prices
pub fn merge_l2_levels(
    first: &[L2Level],
    second: &[L2Level],
    side: BookSide,
    depth: usize,
) -> Vec<L2Level> {
    let mut merged: Vec<L2Level> = Vec::with_capacity(depth.min(first.len() + second.len()));
    let (mut i, mut j) = (0, 0);

    while i < first.len() || j < second.len() {
        let take_first = match (first.get(i), second.get(j)) {
            (Some(a), Some(b)) => !side.is_better(b.price, a.price),
            (Some(_), None) => true,
            _ => false,
        };
        let level = if take_first {
            i += 1;
            first[i - 1]
        } else {
            j += 1;
            second[j - 1]
        };

        if !push_level(&mut merged, level, depth) {
            break;
        }
    }

    merged
}

/// Bucket `levels` into multiples of `tick`
///
/// Bids round down and asks round up so grouping never shows a better price
/// than is actually available.
pub fn group_l2_levels(
    levels: &[L2Level],
    tick: u128,
    side: BookSide,
    depth: usize,
) -> SimResult<Vec<L2Level>> {
    if tick == 0 {
        return Err(SimulationError::invalid_argument("grouping tick must be positive"));
    }

    let mut grouped: Vec<L2Level> = Vec::new();
    for level in levels {
        let bucket = match side {
            BookSide::Bid => level.price / tick * tick,
            BookSide::Ask => level.price.safe_div_ceil(tick)? * tick,
        };
        let level = L2Level {
            price: bucket,
            ..*level
        };

        if !push_level(&mut grouped, level, depth) {
            break;
        }
    }

    Ok(grouped)
}

/// Merged and optionally grouped L2 book
///
/// `bids` and `asks` are the resting orders of each side, best price first.
pub fn build_l2_book<B, A>(
    market: &Market,
    oracle: &OraclePriceData,
    now: i64,
    bids: B,
    asks: A,
    excluded: &HashSet<OwnerId>,
    params: &L2BookParams,
) -> SimResult<L2OrderBook>
where
    B: IntoIterator<Item = RestingOrder>,
    A: IntoIterator<Item = RestingOrder>,
{
    let side_levels = |side: BookSide, orders: Vec<RestingOrder>| -> SimResult<Vec<L2Level>> {
        // grouping collapses levels, so truncate only after it
        let merge_depth = match params.grouping_tick {
            Some(_) => usize::MAX,
            None => params.depth,
        };
        let vamm = vamm_l2_levels(market, oracle, now, side, &params.vamm)?;
        let dlob = resting_order_levels(orders, oracle, side, excluded, merge_depth)?;
        let merged = merge_l2_levels(&vamm, &dlob, side, merge_depth);

        match params.grouping_tick {
            Some(tick) => group_l2_levels(&merged, tick, side, params.depth),
            None => Ok(merged),
        }
    };

    Ok(L2OrderBook {
        bids: side_levels(BookSide::Bid, bids.into_iter().collect())?,
        asks: side_levels(BookSide::Ask, asks.into_iter().collect())?,
    })
}
