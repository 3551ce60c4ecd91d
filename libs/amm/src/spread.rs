//! Spread & inventory model
//!
//! The AMM never quotes its raw reserve price to takers. Each side gets its own
//! spread in `BID_ASK_SPREAD_PRECISION` units, widened by volatility, oracle
//! divergence, inventory skew, effective leverage and recent revenue, then
//! capped proportionally at the market's max target spread. The spreads are
//! turned into a pair of shifted curves (one per taker direction) that the
//! trade solver and the liquidity walker price against.

use crate::curve::{calculate_market_open_bids_asks, CurveState};
use crate::twap::calculate_live_oracle_twap;
use perpsim_types::{
    Amm, Cast, Market, OraclePriceData, PositionDirection, SafeDivCeil, SafeMath, SimResult,
    SimulationError, U192Ext, U192, AMM_TIMES_PEG_TO_QUOTE_PRECISION_RATIO_I128,
    AMM_TO_QUOTE_PRECISION_RATIO_I128, BID_ASK_SPREAD_PRECISION, BID_ASK_SPREAD_PRECISION_I128,
    DEFAULT_LARGE_BID_ASK_FACTOR, DEFAULT_REVENUE_SINCE_LAST_FUNDING_SPREAD_RETREAT,
    MAX_BID_ASK_INVENTORY_SKEW_FACTOR, PERCENTAGE_PRECISION, PERCENTAGE_PRECISION_I128,
    PRICE_PRECISION_I128,
};
use serde::Serialize;
use std::cmp::{max, min};
use tracing::{debug, warn};

/// Everything the spread pipeline reads, flattened out of the AMM
///
/// [`calculate_spreads`] fills the oracle-dependent fields with live values;
/// tests and callers replaying historical states can set them directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpreadTerms {
    pub base_spread: u128,
    pub max_spread: u128,
    pub last_oracle_reserve_price_spread_pct: i128,
    pub last_oracle_conf_pct: u128,
    pub quote_asset_reserve: u128,
    pub terminal_quote_asset_reserve: u128,
    pub peg_multiplier: u128,
    pub base_asset_amount_with_amm: i128,
    pub reserve_price: u128,
    pub total_fee_minus_distributions: i128,
    pub net_revenue_since_last_funding: i128,
    pub base_asset_reserve: u128,
    pub min_base_asset_reserve: u128,
    pub max_base_asset_reserve: u128,
    pub mark_std: u128,
    pub oracle_std: u128,
    pub long_intensity_volume: u128,
    pub short_intensity_volume: u128,
    pub volume_24h: u128,
}

impl SpreadTerms {
    /// Terms from the stored AMM fields, priced at `reserve_price`
    pub fn from_amm(amm: &Amm, reserve_price: u128) -> Self {
        Self {
            base_spread: u128::from(amm.base_spread),
            max_spread: u128::from(amm.max_spread),
            last_oracle_reserve_price_spread_pct: amm.last_oracle_reserve_price_spread_pct,
            last_oracle_conf_pct: amm.last_oracle_conf_pct,
            quote_asset_reserve: amm.quote_asset_reserve,
            terminal_quote_asset_reserve: amm.terminal_quote_asset_reserve,
            peg_multiplier: amm.peg_multiplier,
            base_asset_amount_with_amm: amm.base_asset_amount_with_amm,
            reserve_price,
            total_fee_minus_distributions: amm.total_fee_minus_distributions,
            net_revenue_since_last_funding: amm.net_revenue_since_last_funding,
            base_asset_reserve: amm.base_asset_reserve,
            min_base_asset_reserve: amm.min_base_asset_reserve,
            max_base_asset_reserve: amm.max_base_asset_reserve,
            mark_std: amm.mark_std,
            oracle_std: amm.oracle_std,
            long_intensity_volume: amm.long_intensity_volume,
            short_intensity_volume: amm.short_intensity_volume,
            volume_24h: amm.volume_24h,
        }
    }
}

/// Per-side spreads, `BID_ASK_SPREAD_PRECISION`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Spreads {
    /// Applied to takers going long (the ask)
    pub long_spread: u128,
    /// Applied to takers going short (the bid)
    pub short_spread: u128,
    /// Upper bound on `long_spread + short_spread`
    pub max_target_spread: u128,
}

impl Spreads {
    pub fn for_direction(&self, direction: PositionDirection) -> u128 {
        match direction {
            PositionDirection::Long => self.long_spread,
            PositionDirection::Short => self.short_spread,
        }
    }
}

/// Volatility component of each side
///
/// Blends the oracle confidence with the average of mark and oracle standard
/// deviation, scaled per side by that side's share of 24h volume (clamped to
/// 1%..160%). Small confidence intervals only contribute a tenth.
pub fn calculate_long_short_vol_spread(
    last_oracle_conf_pct: u128,
    reserve_price: u128,
    mark_std: u128,
    oracle_std: u128,
    long_intensity_volume: u128,
    short_intensity_volume: u128,
    volume_24h: u128,
) -> SimResult<(u128, u128)> {
    let avg_std_pct = oracle_std
        .safe_add(mark_std)?
        .safe_mul(PERCENTAGE_PRECISION)?
        .safe_div(reserve_price)?
        / 2;
    let vol_spread = max(last_oracle_conf_pct, avg_std_pct / 2);

    let factor_clamp_min = PERCENTAGE_PRECISION / 100;
    let factor_clamp_max = 16 * PERCENTAGE_PRECISION / 10;
    let volume_factor = |intensity: u128| -> SimResult<u128> {
        let factor = intensity
            .safe_mul(PERCENTAGE_PRECISION)?
            .safe_div(max(volume_24h, 1))?;
        Ok(factor.clamp(factor_clamp_min, factor_clamp_max))
    };
    let long_vol_spread_factor = volume_factor(long_intensity_volume)?;
    let short_vol_spread_factor = volume_factor(short_intensity_volume)?;

    let conf_component = if last_oracle_conf_pct <= PERCENTAGE_PRECISION / 400 {
        last_oracle_conf_pct / 10
    } else {
        last_oracle_conf_pct
    };

    Ok((
        max(
            conf_component,
            vol_spread
                .safe_mul(long_vol_spread_factor)?
                .safe_div(PERCENTAGE_PRECISION)?,
        ),
        max(
            conf_component,
            vol_spread
                .safe_mul(short_vol_spread_factor)?
                .safe_div(PERCENTAGE_PRECISION)?,
        ),
    ))
}

/// Multiplier, `BID_ASK_SPREAD_PRECISION`, for the side the AMM is exposed on
///
/// Grows with the net position relative to the smaller of the AMM's open
/// sides. A flat AMM returns exactly `BID_ASK_SPREAD_PRECISION`.
pub fn calculate_spread_inventory_scale(
    base_asset_amount_with_amm: i128,
    base_asset_reserve: u128,
    min_base_asset_reserve: u128,
    max_base_asset_reserve: u128,
    directional_spread: u128,
    max_spread: u128,
) -> SimResult<u128> {
    if base_asset_amount_with_amm == 0 {
        return Ok(BID_ASK_SPREAD_PRECISION);
    }

    let (open_bids, open_asks) = calculate_market_open_bids_asks(
        base_asset_reserve,
        min_base_asset_reserve,
        max_base_asset_reserve,
        0,
    )?;
    let min_side_liquidity = max(min(open_bids, open_asks), 1).cast::<i128>()?;

    let inventory_scale = base_asset_amount_with_amm
        .safe_mul(PERCENTAGE_PRECISION_I128)?
        .safe_div(min_side_liquidity)?
        .unsigned_abs();
    let inventory_scale_capped = min(inventory_scale, PERCENTAGE_PRECISION);

    let inventory_scale_max = max(
        MAX_BID_ASK_INVENTORY_SKEW_FACTOR,
        max_spread
            .safe_mul(BID_ASK_SPREAD_PRECISION)?
            .safe_div(max(directional_spread, 1))?,
    );

    Ok(min(
        inventory_scale_max,
        BID_ASK_SPREAD_PRECISION.safe_add(
            inventory_scale_max
                .safe_mul(inventory_scale_capped)?
                .safe_div(PERCENTAGE_PRECISION)?,
        )?,
    ))
}

/// Multiplier, `BID_ASK_SPREAD_PRECISION`, from the AMM's effective leverage
///
/// Leverage is the unrealised exposure of user positions against the curve
/// (marked at the reserve price, net of what the terminal curve would pay)
/// relative to accumulated fees.
pub fn calculate_spread_leverage_scale(
    quote_asset_reserve: u128,
    terminal_quote_asset_reserve: u128,
    peg_multiplier: u128,
    base_asset_amount_with_amm: i128,
    reserve_price: u128,
    total_fee_minus_distributions: i128,
) -> SimResult<u128> {
    let net_base_asset_value = quote_asset_reserve
        .cast::<i128>()?
        .safe_sub(terminal_quote_asset_reserve.cast::<i128>()?)?
        .safe_mul(peg_multiplier.cast::<i128>()?)?
        .safe_div(AMM_TIMES_PEG_TO_QUOTE_PRECISION_RATIO_I128)?;

    let local_base_asset_value = base_asset_amount_with_amm
        .safe_mul(reserve_price.cast::<i128>()?)?
        .safe_div(AMM_TO_QUOTE_PRECISION_RATIO_I128.safe_mul(PRICE_PRECISION_I128)?)?;

    let effective_leverage = max(0, local_base_asset_value.safe_sub(net_base_asset_value)?)
        .safe_mul(BID_ASK_SPREAD_PRECISION_I128)?
        .safe_div(max(0, total_fee_minus_distributions).safe_add(1)?)?;

    Ok(min(
        MAX_BID_ASK_INVENTORY_SKEW_FACTOR,
        BID_ASK_SPREAD_PRECISION
            .safe_add(max(0, effective_leverage).cast::<u128>()?)?
            .safe_add(1)?,
    ))
}

/// Extra `(long, short)` spread once revenue since the last funding update
/// falls below the retreat threshold
///
/// The side that would add to the AMM's exposure takes the full retreat and
/// the other side half of it.
pub fn calculate_spread_revenue_retreat(
    net_revenue_since_last_funding: i128,
    base_asset_amount_with_amm: i128,
    base_spread: u128,
    max_target_spread: u128,
) -> SimResult<(u128, u128)> {
    if net_revenue_since_last_funding >= DEFAULT_REVENUE_SINCE_LAST_FUNDING_SPREAD_RETREAT {
        return Ok((0, 0));
    }

    let max_retreat = max_target_spread / 10;
    let revenue_retreat_amount = if net_revenue_since_last_funding
        >= DEFAULT_REVENUE_SINCE_LAST_FUNDING_SPREAD_RETREAT.safe_mul(1_000)?
    {
        min(
            max_retreat,
            base_spread
                .safe_mul(net_revenue_since_last_funding.unsigned_abs())?
                .safe_div(DEFAULT_REVENUE_SINCE_LAST_FUNDING_SPREAD_RETREAT.unsigned_abs())?,
        )
    } else {
        max_retreat
    };
    let half_revenue_retreat_amount = revenue_retreat_amount / 2;

    Ok(match base_asset_amount_with_amm.signum() {
        1 => (revenue_retreat_amount, half_revenue_retreat_amount),
        -1 => (half_revenue_retreat_amount, revenue_retreat_amount),
        _ => (half_revenue_retreat_amount, half_revenue_retreat_amount),
    })
}

/// Scale both sides down to `max_spread` keeping their ratio
///
/// The larger side is rounded up and the smaller side takes the remainder,
/// so the total lands exactly on the cap.
pub fn cap_to_max_spread(
    mut long_spread: u128,
    mut short_spread: u128,
    max_spread: u128,
) -> SimResult<(u128, u128)> {
    let total_spread = long_spread.safe_add(short_spread)?;

    if total_spread > max_spread {
        if long_spread > short_spread {
            long_spread = long_spread
                .safe_mul(max_spread)?
                .safe_div_ceil(total_spread)?;
            short_spread = max_spread.safe_sub(long_spread)?;
        } else {
            short_spread = short_spread
                .safe_mul(max_spread)?
                .safe_div_ceil(total_spread)?;
            long_spread = max_spread.safe_sub(short_spread)?;
        }
    }

    let new_total_spread = long_spread.safe_add(short_spread)?;
    if new_total_spread > max_spread {
        return Err(SimulationError::invariant(format!(
            "capped spread total {new_total_spread} exceeds max {max_spread}"
        )));
    }

    Ok((long_spread, short_spread))
}

/// Run the full spread pipeline over `terms`
pub fn calculate_spread(terms: &SpreadTerms) -> SimResult<Spreads> {
    if terms.base_spread == 0 {
        return Ok(Spreads {
            long_spread: terms.base_spread / 2,
            short_spread: terms.base_spread / 2,
            max_target_spread: terms.max_spread,
        });
    }

    let (long_vol_spread, short_vol_spread) = calculate_long_short_vol_spread(
        terms.last_oracle_conf_pct,
        terms.reserve_price,
        terms.mark_std,
        terms.oracle_std,
        terms.long_intensity_volume,
        terms.short_intensity_volume,
        terms.volume_24h,
    )?;

    let mut long_spread = max(terms.base_spread / 2, long_vol_spread);
    let mut short_spread = max(terms.base_spread / 2, short_vol_spread);

    let oracle_pct = terms.last_oracle_reserve_price_spread_pct;
    let max_std_pct = max(terms.mark_std, terms.oracle_std)
        .safe_mul(PERCENTAGE_PRECISION)?
        .safe_div(terms.reserve_price)?;
    let max_target_spread = max(
        terms.max_spread,
        min(
            max(
                max(oracle_pct.unsigned_abs(), terms.last_oracle_conf_pct.safe_mul(2)?),
                max_std_pct,
            ),
            BID_ASK_SPREAD_PRECISION,
        ),
    );

    // reserve price below oracle: longs buy cheap, so widen the ask
    if oracle_pct < 0 {
        long_spread = max(long_spread, oracle_pct.unsigned_abs().safe_add(long_vol_spread)?);
    } else if oracle_pct > 0 {
        short_spread = max(short_spread, oracle_pct.unsigned_abs().safe_add(short_vol_spread)?);
    }

    let base_asset_amount_with_amm = terms.base_asset_amount_with_amm;
    let directional_spread = if base_asset_amount_with_amm > 0 {
        long_spread
    } else {
        short_spread
    };
    let inventory_scale = calculate_spread_inventory_scale(
        base_asset_amount_with_amm,
        terms.base_asset_reserve,
        terms.min_base_asset_reserve,
        terms.max_base_asset_reserve,
        directional_spread,
        max_target_spread,
    )?;
    if base_asset_amount_with_amm > 0 {
        long_spread = long_spread
            .safe_mul(inventory_scale)?
            .safe_div(BID_ASK_SPREAD_PRECISION)?;
    } else if base_asset_amount_with_amm < 0 {
        short_spread = short_spread
            .safe_mul(inventory_scale)?
            .safe_div(BID_ASK_SPREAD_PRECISION)?;
    }

    if terms.total_fee_minus_distributions <= 0 {
        long_spread = long_spread
            .safe_mul(DEFAULT_LARGE_BID_ASK_FACTOR)?
            .safe_div(BID_ASK_SPREAD_PRECISION)?;
        short_spread = short_spread
            .safe_mul(DEFAULT_LARGE_BID_ASK_FACTOR)?
            .safe_div(BID_ASK_SPREAD_PRECISION)?;
    } else {
        let leverage_scale = calculate_spread_leverage_scale(
            terms.quote_asset_reserve,
            terms.terminal_quote_asset_reserve,
            terms.peg_multiplier,
            base_asset_amount_with_amm,
            terms.reserve_price,
            terms.total_fee_minus_distributions,
        )?;
        if base_asset_amount_with_amm > 0 {
            long_spread = long_spread
                .safe_mul(leverage_scale)?
                .safe_div(BID_ASK_SPREAD_PRECISION)?;
        } else {
            short_spread = short_spread
                .safe_mul(leverage_scale)?
                .safe_div(BID_ASK_SPREAD_PRECISION)?;
        }
    }

    let (long_retreat, short_retreat) = calculate_spread_revenue_retreat(
        terms.net_revenue_since_last_funding,
        base_asset_amount_with_amm,
        terms.base_spread,
        max_target_spread,
    )?;
    long_spread = long_spread.safe_add(long_retreat)?;
    short_spread = short_spread.safe_add(short_retreat)?;

    let (long_spread, short_spread) = cap_to_max_spread(long_spread, short_spread, max_target_spread)?;

    Ok(Spreads {
        long_spread,
        short_spread,
        max_target_spread,
    })
}

/// Live oracle standard deviation
///
/// Distance between the live oracle TWAP and the current oracle price, plus
/// the stored std decayed by the time since the last oracle update. Invalid
/// oracles fall back to the stored value.
pub fn calculate_live_oracle_std(
    amm: &Amm,
    oracle: &OraclePriceData,
    reserve_price: u128,
    now: i64,
) -> SimResult<u128> {
    if !oracle.is_valid() {
        return Ok(amm.oracle_std);
    }

    let since_last = max(
        1,
        now.safe_sub(amm.historical_oracle_data.last_oracle_price_twap_ts)?,
    )
    .cast::<u128>()?;
    let since_start = max(0, amm.funding_period.safe_sub(since_last.cast::<i64>()?)?).cast::<u128>()?;

    let live_oracle_twap = calculate_live_oracle_twap(amm, oracle, reserve_price, now, amm.funding_period)?;
    let price_deviation = live_oracle_twap.safe_sub(oracle.price)?.unsigned_abs();

    let decayed_std = amm
        .oracle_std
        .safe_mul(since_start)?
        .safe_div(since_start.safe_add(since_last)?)?;

    price_deviation.safe_add(decayed_std)
}

/// Oracle confidence as a fraction of the reserve price, `BID_ASK_SPREAD_PRECISION`
///
/// The stored value decays toward the live one, so a single tight sample
/// cannot collapse the spread immediately.
pub fn get_new_oracle_conf_pct(
    amm: &Amm,
    oracle: &OraclePriceData,
    reserve_price: u128,
    now: i64,
) -> SimResult<u128> {
    let conf_interval_pct = oracle
        .confidence
        .safe_mul(BID_ASK_SPREAD_PRECISION)?
        .safe_div(reserve_price)?;

    let since_last = max(
        0,
        now.safe_sub(amm.historical_oracle_data.last_oracle_price_twap_ts)?,
    );

    let lower_bound_conf_pct = if since_last > 0 {
        let divisor = max(21i64.safe_sub(since_last)?, 5).cast::<u128>()?;
        amm.last_oracle_conf_pct
            .safe_sub(amm.last_oracle_conf_pct.safe_div(divisor)?)?
    } else {
        amm.last_oracle_conf_pct
    };

    Ok(max(conf_interval_pct, lower_bound_conf_pct))
}

/// `(reserve_price - oracle_price) / reserve_price`, `BID_ASK_SPREAD_PRECISION`
pub fn calculate_oracle_reserve_price_spread_pct(
    reserve_price: u128,
    oracle_price: i128,
) -> SimResult<i128> {
    let reserve_price = reserve_price.cast::<i128>()?;
    reserve_price
        .safe_sub(oracle_price)?
        .safe_mul(BID_ASK_SPREAD_PRECISION_I128)?
        .safe_div(reserve_price)
}

/// Spreads the market would quote at `now` against `oracle`
pub fn calculate_spreads(market: &Market, oracle: &OraclePriceData, now: i64) -> SimResult<Spreads> {
    let amm = &market.amm;
    let reserve_price = CurveState::from_amm(amm).reserve_price()?;
    let mut terms = SpreadTerms::from_amm(amm, reserve_price);

    if oracle.is_valid() {
        terms.last_oracle_reserve_price_spread_pct =
            calculate_oracle_reserve_price_spread_pct(reserve_price, oracle.price)?;
        terms.oracle_std = calculate_live_oracle_std(amm, oracle, reserve_price, now)?;
    }
    terms.last_oracle_conf_pct = get_new_oracle_conf_pct(amm, oracle, reserve_price, now)?;

    let spreads = calculate_spread(&terms)?;
    debug!(
        market_index = market.market_index,
        long_spread = spreads.long_spread,
        short_spread = spreads.short_spread,
        max_target_spread = spreads.max_target_spread,
        "spreads computed"
    );
    Ok(spreads)
}

/// Shift `curve` by half of `spread` in the taker's favour-reducing direction
///
/// Long takers see a richer quote reserve (higher ask); short takers a poorer
/// one (lower bid). The resulting base reserve is clamped so it never crosses
/// the market's min/max bounds.
///
/// The half spread saturates at 100%; a spread of one unit truncates to no
/// shift at all.
pub fn calculate_spread_reserves(
    curve: &CurveState,
    spread: u128,
    direction: PositionDirection,
    min_base_asset_reserve: u128,
    max_base_asset_reserve: u128,
) -> SimResult<CurveState> {
    let half_spread = min(spread / 2, BID_ASK_SPREAD_PRECISION);
    if half_spread == 0 {
        return Ok(*curve);
    }

    let quote_asset_reserve_delta = curve
        .quote_asset_reserve
        .safe_div(BID_ASK_SPREAD_PRECISION.safe_div(half_spread)?)?;

    let quote_asset_reserve = match direction {
        PositionDirection::Long => curve.quote_asset_reserve.safe_add(quote_asset_reserve_delta)?,
        PositionDirection::Short => curve.quote_asset_reserve.safe_sub(quote_asset_reserve_delta)?,
    };

    let invariant = curve.invariant()?;
    // an emptied quote side leaves only the max base bound to land on
    let base_asset_reserve = match quote_asset_reserve {
        0 if max_base_asset_reserve == 0 => {
            return Err(SimulationError::ReserveExhausted {
                amount: quote_asset_reserve_delta,
                reserve: curve.quote_asset_reserve,
            })
        }
        0 => u128::MAX,
        quote_asset_reserve => invariant
            .safe_div(U192::from(quote_asset_reserve))?
            .try_to_u128()?,
    };

    let bound = match direction {
        PositionDirection::Long => {
            let bound = min(min_base_asset_reserve, curve.base_asset_reserve);
            (base_asset_reserve < bound).then_some(bound)
        }
        PositionDirection::Short => {
            let bound = max(max_base_asset_reserve, curve.base_asset_reserve);
            (max_base_asset_reserve > 0 && base_asset_reserve > bound).then_some(bound)
        }
    };

    match bound {
        Some(bound) => {
            warn!(
                %direction,
                base_asset_reserve,
                bound,
                "spread reserves clamped to base reserve bound"
            );
            Ok(CurveState {
                base_asset_reserve: bound,
                quote_asset_reserve: invariant.safe_div(U192::from(bound))?.try_to_u128()?,
                ..*curve
            })
        }
        None => Ok(CurveState {
            base_asset_reserve,
            quote_asset_reserve,
            ..*curve
        }),
    }
}

/// Spread-adjusted curve a taker in `direction` trades against
///
/// The peg is the snapshot peg; formulaic repegging is not simulated.
pub fn calculate_updated_amm_spread_reserves(
    market: &Market,
    direction: PositionDirection,
    oracle: &OraclePriceData,
    now: i64,
) -> SimResult<CurveState> {
    market.validate()?;
    let spreads = calculate_spreads(market, oracle, now)?;
    calculate_spread_reserves(
        &CurveState::from_amm(&market.amm),
        spreads.for_direction(direction),
        direction,
        market.amm.min_base_asset_reserve,
        market.amm.max_base_asset_reserve,
    )
}

/// `(bid_curve, ask_curve)` from a single spread computation
pub fn calculate_bid_ask_curves(
    market: &Market,
    oracle: &OraclePriceData,
    now: i64,
) -> SimResult<(CurveState, CurveState)> {
    market.validate()?;
    let spreads = calculate_spreads(market, oracle, now)?;
    let curve = CurveState::from_amm(&market.amm);
    let amm = &market.amm;

    let bid = calculate_spread_reserves(
        &curve,
        spreads.short_spread,
        PositionDirection::Short,
        amm.min_base_asset_reserve,
        amm.max_base_asset_reserve,
    )?;
    let ask = calculate_spread_reserves(
        &curve,
        spreads.long_spread,
        PositionDirection::Long,
        amm.min_base_asset_reserve,
        amm.max_base_asset_reserve,
    )?;
    Ok((bid, ask))
}

/// `(bid, ask)` prices, `PRICE_PRECISION`
pub fn calculate_bid_ask_price(
    market: &Market,
    oracle: &OraclePriceData,
    now: i64,
) -> SimResult<(u128, u128)> {
    let (bid, ask) = calculate_bid_ask_curves(market, oracle, now)?;
    Ok((bid.reserve_price()?, ask.reserve_price()?))
}
