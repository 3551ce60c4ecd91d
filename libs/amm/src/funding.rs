//! Funding estimator
//!
//! Predicts the funding rate the authoritative engine would settle at the
//! next update from the live mark and oracle TWAPs. Rates are the TWAP spread
//! expressed per funding period in `FUNDING_RATE_PRECISION`; a positive rate
//! means longs pay shorts.

use crate::curve::CurveState;
use crate::spread::calculate_bid_ask_price;
use crate::twap::{calculate_live_oracle_twap, calculate_new_twap, sanitize_new_price};
use perpsim_types::{
    Amm, Cast, Market, OraclePriceData, SafeMath, SimResult, SimulationError,
    AMM_TO_QUOTE_PRECISION_RATIO_I128, FIVE_MINUTES, FUNDING_PAYMENT_PRECISION, FUNDING_RATE_PRECISION,
    ONE_HOUR, PERCENTAGE_PRECISION_I128, TWENTY_FOUR_HOURS,
};
use serde::Serialize;
use std::cmp::{max, min};
use tracing::debug;

/// Funding payments are quoted per `FUNDING_RATE_PRECISION × AMM_TO_QUOTE_PRECISION_RATIO`
const FUNDING_PAYMENT_DENOMINATOR: i128 =
    FUNDING_RATE_PRECISION as i128 * AMM_TO_QUOTE_PRECISION_RATIO_I128;

/// Everything a funding preview shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FundingEstimate {
    /// `PRICE_PRECISION`
    pub live_mark_twap: u128,
    /// `PRICE_PRECISION`
    pub live_oracle_twap: i128,
    /// `live_mark_twap - live_oracle_twap`, `PRICE_PRECISION`
    pub twap_spread: i128,
    /// Full-period rate from the current TWAP spread
    pub interpolated_rate: i128,
    /// Interpolated rate scaled by the elapsed fraction of the period
    pub lower_bound_rate: i128,
    /// Interpolated rate with the receiving side limited by the fee pool
    pub capped_rate: i128,
}

/// Mark TWAP the authoritative engine would store if it updated at `now`
///
/// Bid and ask are sanitized against their own TWAPs and blended separately;
/// the funding-period mark TWAP is the mean of the two. The five-minute TWAP
/// blends the mean of the sanitized samples instead. `mark_price`, when given,
/// stands in for both sides; it defaults to the spread-adjusted bid and ask.
pub fn calculate_live_mark_twap(
    market: &Market,
    oracle: &OraclePriceData,
    mark_price: Option<u128>,
    now: i64,
    period: i64,
) -> SimResult<u128> {
    let amm = &market.amm;
    let (bid_price, ask_price) = match mark_price {
        Some(price) => (price, price),
        None => calculate_bid_ask_price(market, oracle, now)?,
    };

    let side_twap = |twap: u128| if twap == 0 { amm.last_mark_price_twap } else { twap };
    let last_bid_twap = side_twap(amm.last_bid_price_twap).cast::<i128>()?;
    let last_ask_twap = side_twap(amm.last_ask_price_twap).cast::<i128>()?;

    let bid_sample = sanitize_new_price(bid_price.cast::<i128>()?, last_bid_twap)?;
    let ask_sample = sanitize_new_price(ask_price.cast::<i128>()?, last_ask_twap)?;
    let last_ts = amm.last_mark_price_twap_ts;

    let mark_twap = if period == FIVE_MINUTES {
        let mid_sample = bid_sample.safe_add(ask_sample)? / 2;
        calculate_new_twap(mid_sample, now, amm.last_mark_price_twap_5min.cast()?, last_ts, period)?
    } else {
        let bid_twap = calculate_new_twap(bid_sample, now, last_bid_twap, last_ts, period)?;
        let ask_twap = calculate_new_twap(ask_sample, now, last_ask_twap, last_ts, period)?;
        bid_twap.safe_add(ask_twap)? / 2
    };
    mark_twap.cast::<u128>()
}

/// Quote the AMM can spend on funding imbalances, `QUOTE_PRECISION`
///
/// A third of the fees left after reserving half of all exchange fees.
pub fn calculate_funding_pool(amm: &Amm) -> SimResult<u128> {
    let reserved = (amm.total_exchange_fee / 2).cast::<i128>()?;
    let pool = amm.total_fee_minus_distributions.safe_sub(reserved)? / 3;
    max(0, pool).cast::<u128>()
}

/// Limit the receiving side's rate to what the payers plus the fee pool cover
///
/// Only bites when the receiving side holds more open interest than the
/// paying side.
pub fn calculate_capped_funding_rate(amm: &Amm, funding_pool: u128, funding_rate: i128) -> SimResult<i128> {
    let long_open_interest = amm.base_asset_amount_long.unsigned_abs();
    let short_open_interest = amm.base_asset_amount_short.unsigned_abs();

    let (payer_open_interest, receiver_open_interest) = if funding_rate > 0 {
        (long_open_interest, short_open_interest)
    } else {
        (short_open_interest, long_open_interest)
    };
    if funding_rate == 0 || receiver_open_interest <= payer_open_interest {
        return Ok(funding_rate);
    }

    let pool_as_rate_notional = funding_pool.safe_mul(FUNDING_PAYMENT_DENOMINATOR.cast::<u128>()?)?;
    let capped_rate = payer_open_interest
        .safe_mul(funding_rate.unsigned_abs())?
        .safe_add(pool_as_rate_notional)?
        .safe_div(receiver_open_interest)?;

    let rate = min(funding_rate.unsigned_abs(), capped_rate).cast::<i128>()?;
    Ok(rate * funding_rate.signum())
}

/// Preview the next funding update at `now`
pub fn calculate_funding_estimate(
    market: &Market,
    oracle: &OraclePriceData,
    now: i64,
) -> SimResult<FundingEstimate> {
    market.validate()?;
    let amm = &market.amm;
    let period = amm.funding_period;
    if period <= 0 {
        return Err(SimulationError::invalid_argument(format!(
            "market {} has non-positive funding period {period}",
            market.market_index
        )));
    }

    let reserve_price = CurveState::from_amm(amm).reserve_price()?;
    let live_mark_twap = calculate_live_mark_twap(market, oracle, None, now, period)?;
    let live_oracle_twap = calculate_live_oracle_twap(amm, oracle, reserve_price, now, period)?;
    let twap_spread = live_mark_twap.cast::<i128>()?.safe_sub(live_oracle_twap)?;

    let period_adjustment = TWENTY_FOUR_HOURS.safe_div(max(ONE_HOUR, period))?.cast::<i128>()?;
    let interpolated_rate = twap_spread
        .safe_mul(FUNDING_PAYMENT_PRECISION.cast::<i128>()?)?
        .safe_div(period_adjustment)?;

    let elapsed = now.safe_sub(amm.last_funding_rate_ts)?.clamp(0, period);
    let lower_bound_rate = interpolated_rate
        .safe_mul(elapsed.cast::<i128>()?)?
        .safe_div(period.cast::<i128>()?)?;

    let funding_pool = calculate_funding_pool(amm)?;
    let capped_rate = calculate_capped_funding_rate(amm, funding_pool, interpolated_rate)?;

    debug!(
        market_index = market.market_index,
        live_mark_twap,
        live_oracle_twap,
        interpolated_rate,
        capped_rate,
        "funding estimate"
    );

    Ok(FundingEstimate {
        live_mark_twap,
        live_oracle_twap,
        twap_spread,
        interpolated_rate,
        lower_bound_rate,
        capped_rate,
    })
}

/// `(long_rate, short_rate)` each side would settle at
///
/// The side with more open interest gets the capped rate.
pub fn calculate_long_short_funding_rates(amm: &Amm, estimate: &FundingEstimate) -> (i128, i128) {
    let long_open_interest = amm.base_asset_amount_long.unsigned_abs();
    let short_open_interest = amm.base_asset_amount_short.unsigned_abs();

    match long_open_interest.cmp(&short_open_interest) {
        std::cmp::Ordering::Greater => (estimate.capped_rate, estimate.interpolated_rate),
        std::cmp::Ordering::Less => (estimate.interpolated_rate, estimate.capped_rate),
        std::cmp::Ordering::Equal => (estimate.interpolated_rate, estimate.interpolated_rate),
    }
}

/// Quote owed to (positive) or by (negative) a position, `QUOTE_PRECISION`
///
/// Rounds toward negative infinity so the payer never pays less than owed.
pub fn calculate_funding_payment(
    cumulative_funding_rate: i128,
    last_cumulative_funding_rate: i128,
    base_asset_amount: i128,
) -> SimResult<i128> {
    let funding_rate_delta = cumulative_funding_rate.safe_sub(last_cumulative_funding_rate)?;
    let payment_numerator = funding_rate_delta.safe_mul(base_asset_amount)?.safe_mul(-1)?;
    Ok(payment_numerator.div_euclid(FUNDING_PAYMENT_DENOMINATOR))
}

/// Funding rate as a fraction of the oracle TWAP, `PERCENTAGE_PRECISION`
pub fn funding_rate_as_percentage(funding_rate: i128, oracle_twap: i128) -> SimResult<i128> {
    if oracle_twap <= 0 {
        return Err(SimulationError::NonPositivePrice {
            field: "oracle_twap",
            price: oracle_twap,
        });
    }
    funding_rate
        .safe_mul(PERCENTAGE_PRECISION_I128)?
        .safe_div(oracle_twap.safe_mul(FUNDING_PAYMENT_PRECISION.cast::<i128>()?)?)
}
