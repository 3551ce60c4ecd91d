//! Liquidity walker merging the spread-adjusted vAMM curve with resting orders
//!
//! Each step lets the curve fill up to the price of the next resting order,
//! solved in closed form from the constant-product invariant, then hands the
//! taker to that order once the curve has reached it. Amounts are tracked in
//! the request's own denomination so quote-sized requests stop exactly on the
//! requested quote.

use crate::cursor::{OrderCursor, OrderLevel};
use perpsim_amm::{
    base_reserve_at_price, calculate_market_open_bids_asks, calculate_updated_amm_spread_reserves,
    get_swap_direction, CurveState, SwapResult,
};
use perpsim_config::TradeSettings;
use perpsim_types::{
    base_to_quote, calculate_entry_price, quote_to_base, AssetAmount, AssetType, Market,
    OraclePriceData, OwnerId, PositionDirection, RestingOrder, SimResult, SimulationError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// What to do when the book runs dry before the request is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Anything short of the full amount is [`SimulationError::InsufficientLiquidity`]
    #[default]
    Exact,
    /// Return whatever was fillable
    AllowPartial,
}

impl From<&TradeSettings> for FillMode {
    fn from(settings: &TradeSettings) -> Self {
        if settings.allow_partial_fills {
            FillMode::AllowPartial
        } else {
            FillMode::Exact
        }
    }
}

/// A taker order to walk through the merged book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillRequest {
    pub direction: PositionDirection,
    pub amount: AssetAmount,
    #[serde(default)]
    pub mode: FillMode,
}

impl FillRequest {
    pub fn exact(direction: PositionDirection, amount: AssetAmount) -> Self {
        Self {
            direction,
            amount,
            mode: FillMode::Exact,
        }
    }
}

/// Portion of the request matched against one resting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFill {
    pub order_id: u32,
    pub owner: OwnerId,
    pub price: u128,
    pub base_asset_amount: u128,
    pub quote_asset_amount: u128,
}

/// Cumulative outcome of a walk
///
/// Prices are `PRICE_PRECISION` and zero when nothing was filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillResult {
    pub base_filled: u128,
    pub quote_filled: u128,
    /// Price of the first unit filled
    pub best_price: u128,
    /// Marginal price after the last unit filled
    pub worst_price: u128,
    pub amm_base_filled: u128,
    pub amm_quote_filled: u128,
    pub order_fills: Vec<OrderFill>,
}

impl FillResult {
    /// Filled amount in the denomination of `amount`
    pub fn filled(&self, amount: AssetAmount) -> u128 {
        match amount.asset_type() {
            AssetType::Base => self.base_filled,
            AssetType::Quote => self.quote_filled,
        }
    }

    /// Average fill price
    pub fn entry_price(&self) -> SimResult<u128> {
        calculate_entry_price(self.quote_filled, self.base_filled)
    }

    fn record(&mut self, price_before: u128, price_after: u128, base: u128, quote: u128) {
        if self.base_filled == 0 && self.quote_filled == 0 {
            self.best_price = price_before;
        }
        self.worst_price = price_after;
        self.base_filled += base;
        self.quote_filled += quote;
    }
}

/// Fill `request` against the vAMM and the resting orders on the opposite side
///
/// `orders` must be best price first; owners in `excluded` are skipped. In
/// [`FillMode::Exact`] a shortfall is an error rather than a truncated result.
pub fn walk_liquidity<I>(
    request: &FillRequest,
    market: &Market,
    oracle: &OraclePriceData,
    orders: I,
    excluded: &HashSet<OwnerId>,
    now: i64,
) -> SimResult<FillResult>
where
    I: IntoIterator<Item = RestingOrder>,
{
    let direction = request.direction;
    let requested = request.amount.amount();
    let amm = &market.amm;

    let mut curve = calculate_updated_amm_spread_reserves(market, direction, oracle, now)?;
    let (open_bids, open_asks) = calculate_market_open_bids_asks(
        curve.base_asset_reserve,
        amm.min_base_asset_reserve,
        amm.max_base_asset_reserve,
        amm.order_step_size,
    )?;
    let mut amm_open = match direction {
        PositionDirection::Long => open_asks,
        PositionDirection::Short => open_bids,
    };

    let mut cursor = OrderCursor::new(orders, direction, oracle, excluded);
    let mut result = FillResult::default();

    while result.filled(request.amount) < requested {
        let needed = request.amount.with_amount(requested - result.filled(request.amount));
        let next = cursor.peek()?;

        let capacity = amm_capacity(&curve, amm_open, direction, next.map(|level| level.price))?;
        if capacity > 0 {
            let price_before = curve.reserve_price()?;
            let swap = fill_from_amm(&curve, capacity, needed, direction)?;
            curve = swap.curve;
            amm_open = amm_open.saturating_sub(swap.base_asset_amount);

            let price_after = curve.reserve_price()?;
            debug!(
                %direction,
                base = swap.base_asset_amount,
                quote = swap.quote_asset_amount,
                price_before,
                price_after,
                amm_open,
                "filled from vAMM"
            );
            result.record(price_before, price_after, swap.base_asset_amount, swap.quote_asset_amount);
            result.amm_base_filled += swap.base_asset_amount;
            result.amm_quote_filled += swap.quote_asset_amount;
            continue;
        }

        let Some(level) = next else {
            break;
        };
        let (base, quote) = fill_from_order(&level, needed)?;
        if base == 0 {
            // quote left is worth less than one base unit at this price
            debug!(
                %direction,
                order_id = level.order_id,
                price = level.price,
                quote_needed = needed.amount(),
                "remaining quote buys no base from resting order, skipping it"
            );
            cursor.advance();
            continue;
        }
        cursor.consume(base)?;
        debug!(
            %direction,
            order_id = level.order_id,
            price = level.price,
            base,
            quote,
            "filled from resting order"
        );
        result.record(level.price, level.price, base, quote);
        result.order_fills.push(OrderFill {
            order_id: level.order_id,
            owner: level.owner,
            price: level.price,
            base_asset_amount: base,
            quote_asset_amount: quote,
        });
    }

    let filled = result.filled(request.amount);
    if filled < requested {
        match request.mode {
            FillMode::Exact => {
                return Err(SimulationError::InsufficientLiquidity { requested, filled });
            }
            FillMode::AllowPartial => {
                debug!(requested, filled, "walk ended with a partial fill");
            }
        }
    }

    Ok(result)
}

/// Base the curve can give up (long) or absorb (short) before its price
/// reaches `next_order_price`, bounded by the AMM's open liquidity
fn amm_capacity(
    curve: &CurveState,
    amm_open: u128,
    direction: PositionDirection,
    next_order_price: Option<u128>,
) -> SimResult<u128> {
    if amm_open == 0 {
        return Ok(0);
    }
    let Some(order_price) = next_order_price else {
        return Ok(amm_open);
    };

    let price = curve.reserve_price()?;
    let to_order_price = match direction {
        PositionDirection::Long if price < order_price => curve
            .base_asset_reserve
            .saturating_sub(base_reserve_at_price(curve.sqrt_k, curve.peg_multiplier, order_price)?),
        PositionDirection::Short if price > order_price => {
            base_reserve_at_price(curve.sqrt_k, curve.peg_multiplier, order_price)?
                .saturating_sub(curve.base_asset_reserve)
        }
        _ => 0,
    };
    Ok(to_order_price.min(amm_open))
}

fn fill_from_amm(
    curve: &CurveState,
    capacity: u128,
    needed: AssetAmount,
    direction: PositionDirection,
) -> SimResult<SwapResult> {
    let base_direction = get_swap_direction(AssetType::Base, direction);
    match needed {
        AssetAmount::Base(base) => curve.swap(AssetAmount::Base(base.min(capacity)), base_direction),
        AssetAmount::Quote(quote) => {
            let full = curve.swap(AssetAmount::Base(capacity), base_direction)?;
            if full.quote_asset_amount <= quote {
                Ok(full)
            } else {
                curve.swap(needed, get_swap_direction(AssetType::Quote, direction))
            }
        }
    }
}

/// `(base, quote)` taken from `level`; a quote request that ends inside the
/// order is charged exactly the quote still needed
fn fill_from_order(level: &OrderLevel, needed: AssetAmount) -> SimResult<(u128, u128)> {
    match needed {
        AssetAmount::Base(base) => {
            let base = base.min(level.remaining);
            Ok((base, base_to_quote(base, level.price)?))
        }
        AssetAmount::Quote(quote) => {
            let base = quote_to_base(quote, level.price)?;
            if base >= level.remaining {
                Ok((level.remaining, base_to_quote(level.remaining, level.price)?))
            } else {
                Ok((base, quote))
            }
        }
    }
}
