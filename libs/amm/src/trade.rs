//! Trade solver and trade previews
//!
//! Answers two kinds of questions against a market snapshot without mutating
//! it: "what does trading this amount do" ([`calculate_trade_slippage`]) and
//! "how much must I trade to move the price to X" ([`calculate_target_price_trade`]).
//! Both price against the spread-adjusted curve when `use_spread` is set and
//! against the raw reserves otherwise.

use crate::curve::{
    base_reserve_squared_at_price, calculate_price, reserve_to_quote_amount, signed_delta,
    CurveState,
};
use crate::spread::{calculate_bid_ask_price, calculate_updated_amm_spread_reserves};
use perpsim_types::{
    calculate_entry_price, AssetAmount, Market, OraclePriceData, PositionDirection, SafeMath,
    SimResult, SimulationError, U192Ext, U192, PERCENTAGE_PRECISION, PRICE_PRECISION,
};
use serde::Serialize;
use tracing::debug;

/// Slack allowed in the solver's price ordering checks, `PRICE_PRECISION`
const PRICE_TOLERANCE: u128 = PRICE_PRECISION / 100_000;

/// Reserve deltas seen from the user's side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeAcquired {
    /// Base reserve units the user gains (negative when selling)
    pub base_asset_acquired: i128,
    /// Quote reserve units the user gains (negative when buying)
    pub quote_asset_acquired: i128,
    /// Curve the trade was priced on
    pub curve_before: CurveState,
    pub curve_after: CurveState,
}

/// Price impact of a hypothetical trade, all `PRICE_PRECISION`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TradeSlippage {
    /// Entry price distance from the pre-trade price, as a fraction of it
    pub avg_slippage: u128,
    /// Post-trade price distance from the pre-trade price, as a fraction of it
    pub max_slippage: u128,
    pub entry_price: u128,
    pub new_price: u128,
}

/// Trade that moves the curve to a target price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetPriceTrade {
    pub direction: PositionDirection,
    /// `BASE_PRECISION`
    pub base_asset_amount: u128,
    /// `QUOTE_PRECISION`
    pub quote_asset_amount: u128,
    /// Zero when no trade is needed
    pub entry_price: u128,
    /// Target after applying the completion percentage
    pub target_price: u128,
    /// Curve price after the trade
    pub resulting_price: u128,
}

fn trade_curve(
    market: &Market,
    direction: PositionDirection,
    oracle: &OraclePriceData,
    now: i64,
    use_spread: bool,
) -> SimResult<CurveState> {
    if use_spread {
        calculate_updated_amm_spread_reserves(market, direction, oracle, now)
    } else {
        market.validate()?;
        Ok(CurveState::from_amm(&market.amm))
    }
}

/// Reserve deltas for trading `amount` in `direction`
pub fn calculate_trade_acquired_amounts(
    direction: PositionDirection,
    amount: AssetAmount,
    market: &Market,
    oracle: &OraclePriceData,
    now: i64,
    use_spread: bool,
) -> SimResult<TradeAcquired> {
    let curve_before = trade_curve(market, direction, oracle, now, use_spread)?;
    if amount.is_zero() {
        return Ok(TradeAcquired {
            base_asset_acquired: 0,
            quote_asset_acquired: 0,
            curve_before,
            curve_after: curve_before,
        });
    }

    let swap_direction = amount.asset_type().swap_direction(direction);
    let (quote_asset_reserve, base_asset_reserve) = curve_before.reserves_after_swap(amount, swap_direction)?;
    let curve_after = CurveState {
        base_asset_reserve,
        quote_asset_reserve,
        ..curve_before
    };

    Ok(TradeAcquired {
        base_asset_acquired: signed_delta(base_asset_reserve, curve_before.base_asset_reserve)?,
        quote_asset_acquired: signed_delta(quote_asset_reserve, curve_before.quote_asset_reserve)?,
        curve_before,
        curve_after,
    })
}

/// Entry price and slippage of trading `amount` in `direction`
///
/// A zero amount reports zero slippage at the unadjusted reserve price.
pub fn calculate_trade_slippage(
    direction: PositionDirection,
    amount: AssetAmount,
    market: &Market,
    oracle: &OraclePriceData,
    now: i64,
    use_spread: bool,
) -> SimResult<TradeSlippage> {
    if amount.is_zero() {
        market.validate()?;
        let reserve_price = CurveState::from_amm(&market.amm).reserve_price()?;
        return Ok(TradeSlippage {
            entry_price: reserve_price,
            new_price: reserve_price,
            ..Default::default()
        });
    }

    let acquired = calculate_trade_acquired_amounts(direction, amount, market, oracle, now, use_spread)?;
    if acquired.base_asset_acquired == 0 {
        return Err(SimulationError::invalid_argument(format!(
            "{amount:?} is too small to move any base"
        )));
    }

    let old_price = acquired.curve_before.reserve_price()?;
    let new_price = acquired.curve_after.reserve_price()?;
    let entry_price = calculate_price(
        acquired.quote_asset_acquired.unsigned_abs(),
        acquired.base_asset_acquired.unsigned_abs(),
        acquired.curve_before.peg_multiplier,
    )?;

    let moved_the_right_way = match direction {
        PositionDirection::Long => new_price >= old_price,
        PositionDirection::Short => new_price <= old_price,
    };
    if !moved_the_right_way {
        return Err(SimulationError::invariant(format!(
            "{direction} trade moved price from {old_price} to {new_price}"
        )));
    }

    let relative_to_old = |price: u128| -> SimResult<u128> {
        U192::from(price.abs_diff(old_price))
            .safe_mul(U192::from(PRICE_PRECISION))?
            .safe_div(U192::from(old_price))?
            .try_to_u128()
    };

    Ok(TradeSlippage {
        avg_slippage: relative_to_old(entry_price)?,
        max_slippage: relative_to_old(new_price)?,
        entry_price,
        new_price,
    })
}

/// Taker fee on `quote_asset_amount`, `QUOTE_PRECISION`
pub fn calculate_taker_fee(market: &Market, quote_asset_amount: u128) -> SimResult<u128> {
    quote_asset_amount
        .safe_mul(market.fee_tier.fee_numerator)?
        .safe_div(market.fee_tier.fee_denominator)
}

/// Trade that moves the market toward `target_price`
///
/// `completion_pct` (`PERCENTAGE_PRECISION`, in `(0, 100%]`) scales how much of
/// the gap between the current quote and the target is closed. A target inside
/// the current bid/ask needs no trade and is reported as a zero-size trade on
/// the side of the mid price the target falls on.
///
/// The new base reserve is solved from the invariant and biased by one unit so
/// the resulting price never overshoots the target.
pub fn calculate_target_price_trade(
    market: &Market,
    target_price: u128,
    completion_pct: u128,
    oracle: &OraclePriceData,
    now: i64,
    use_spread: bool,
) -> SimResult<TargetPriceTrade> {
    if target_price == 0 {
        return Err(SimulationError::NonPositivePrice {
            field: "target_price",
            price: 0,
        });
    }
    if completion_pct == 0 || completion_pct > PERCENTAGE_PRECISION {
        return Err(SimulationError::InvalidPercentage {
            value: completion_pct,
            max: PERCENTAGE_PRECISION,
        });
    }
    market.validate()?;

    let (bid_price, ask_price) = if use_spread {
        calculate_bid_ask_price(market, oracle, now)?
    } else {
        let reserve_price = CurveState::from_amm(&market.amm).reserve_price()?;
        (reserve_price, reserve_price)
    };

    let scale_gap = |gap: u128| -> SimResult<u128> {
        gap.safe_mul(completion_pct)?.safe_div(PERCENTAGE_PRECISION)
    };
    let (direction, scaled_target) = if target_price > ask_price {
        (
            PositionDirection::Long,
            ask_price.safe_add(scale_gap(target_price - ask_price)?)?,
        )
    } else if target_price < bid_price {
        (
            PositionDirection::Short,
            bid_price.safe_sub(scale_gap(bid_price - target_price)?)?,
        )
    } else {
        let mid_price = bid_price.safe_add(ask_price)?.safe_div(2)?;
        let direction = if target_price < mid_price {
            PositionDirection::Short
        } else {
            PositionDirection::Long
        };
        debug!(target_price, bid_price, ask_price, %direction, "target inside spread, no trade");
        return Ok(zero_trade(direction, target_price, target_price));
    };

    let curve = trade_curve(market, direction, oracle, now, use_spread)?;
    let price_before = curve.reserve_price()?;
    let invariant = curve.invariant()?;

    let base_reserve_squared = base_reserve_squared_at_price(curve.sqrt_k, curve.peg_multiplier, scaled_target)?;
    let base_asset_reserve_after = match direction {
        PositionDirection::Short => base_reserve_squared
            .safe_sub(U192::one())?
            .integer_sqrt()
            .try_to_u128()?
            .safe_sub(1)?,
        PositionDirection::Long => base_reserve_squared
            .safe_add(U192::one())?
            .integer_sqrt()
            .try_to_u128()?
            .safe_add(1)?,
    };
    let quote_asset_reserve_after = invariant
        .safe_div(U192::from(base_asset_reserve_after))?
        .try_to_u128()?;

    let (base_asset_amount, quote_reserve_delta) = match direction {
        PositionDirection::Long if base_asset_reserve_after < curve.base_asset_reserve => (
            curve.base_asset_reserve - base_asset_reserve_after,
            quote_asset_reserve_after.safe_sub(curve.quote_asset_reserve)?,
        ),
        PositionDirection::Short if base_asset_reserve_after > curve.base_asset_reserve => (
            base_asset_reserve_after - curve.base_asset_reserve,
            curve.quote_asset_reserve.safe_sub(quote_asset_reserve_after)?,
        ),
        // rounding left the reserves on the wrong side of the current quote
        _ => return Ok(zero_trade(direction, scaled_target, price_before)),
    };

    let quote_asset_amount = reserve_to_quote_amount(quote_reserve_delta, curve.peg_multiplier)?;
    let entry_price = calculate_entry_price(quote_asset_amount, base_asset_amount)?;
    let resulting_price = calculate_price(
        quote_asset_reserve_after,
        base_asset_reserve_after,
        curve.peg_multiplier,
    )?;

    let ordered = match direction {
        PositionDirection::Long => {
            price_before <= entry_price.safe_add(PRICE_TOLERANCE)?
                && entry_price <= resulting_price.safe_add(PRICE_TOLERANCE)?
                && resulting_price <= scaled_target.safe_add(PRICE_TOLERANCE)?
        }
        PositionDirection::Short => {
            price_before.safe_add(PRICE_TOLERANCE)? >= entry_price
                && entry_price.safe_add(PRICE_TOLERANCE)? >= resulting_price
                && resulting_price.safe_add(PRICE_TOLERANCE)? >= scaled_target
        }
    };
    if !ordered {
        return Err(SimulationError::invariant(format!(
            "{direction} solve out of order: before {price_before}, entry {entry_price}, \
             after {resulting_price}, target {scaled_target}"
        )));
    }

    debug!(
        %direction,
        base_asset_amount,
        quote_asset_amount,
        entry_price,
        resulting_price,
        "target price trade solved"
    );

    Ok(TargetPriceTrade {
        direction,
        base_asset_amount,
        quote_asset_amount,
        entry_price,
        target_price: scaled_target,
        resulting_price,
    })
}

fn zero_trade(direction: PositionDirection, target_price: u128, resulting_price: u128) -> TargetPriceTrade {
    TargetPriceTrade {
        direction,
        base_asset_amount: 0,
        quote_asset_amount: 0,
        entry_price: 0,
        target_price,
        resulting_price,
    }
}
