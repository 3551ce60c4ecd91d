//! Time-weighted price statistics
//!
//! TWAPs are capped-weight moving averages: the stored value is weighted by
//! the time left in the period and the new sample by the time since the last
//! update, so once a full period has elapsed the new sample dominates.

use perpsim_types::{
    Amm, Cast, OraclePriceData, SafeMath, SimResult, FIVE_MINUTES,
};
use std::cmp::{max, min};
use tracing::debug;

/// `(data1 × weight1 + data2 × weight2) / (weight1 + weight2)`, truncating
///
/// A zero weight returns the other sample untouched.
pub fn calculate_weighted_average(
    data1: i128,
    data2: i128,
    weight1: i128,
    weight2: i128,
) -> SimResult<i128> {
    if weight1 == 0 {
        return Ok(data2);
    }
    if weight2 == 0 {
        return Ok(data1);
    }
    let denominator = weight1.safe_add(weight2)?;
    data1
        .safe_mul(weight1)?
        .safe_add(data2.safe_mul(weight2)?)?
        .safe_div(denominator)
}

/// Blend `current_price` into `last_twap` over `period` seconds
pub fn calculate_new_twap(
    current_price: i128,
    now: i64,
    last_twap: i128,
    last_ts: i64,
    period: i64,
) -> SimResult<i128> {
    let since_last = max(1, now.safe_sub(last_ts)?).cast::<i128>()?;
    let from_start = max(1, period.cast::<i128>()?.safe_sub(since_last)?);
    calculate_weighted_average(current_price, last_twap, since_last, from_start)
}

/// Cap a new sample at 33% away from the current TWAP
pub fn sanitize_new_price(new_price: i128, last_price_twap: i128) -> SimResult<i128> {
    if last_price_twap == 0 {
        return Ok(new_price);
    }

    let new_price_spread = new_price.safe_sub(last_price_twap)?;
    let price_twap_33pct = last_price_twap / 3;

    if new_price_spread.unsigned_abs() <= price_twap_33pct.unsigned_abs() {
        return Ok(new_price);
    }
    if new_price > last_price_twap {
        last_price_twap.safe_add(price_twap_33pct)
    } else {
        last_price_twap.safe_sub(price_twap_33pct)
    }
}

/// Pull the oracle price toward the reserve price by its confidence interval
///
/// The pull never crosses 2.5 bps of the reserve price, so the result stays
/// between the oracle and a point just short of the reserve price.
pub fn normalise_oracle_price(reserve_price: u128, oracle: &OraclePriceData) -> SimResult<i128> {
    let reserve_price = reserve_price.cast::<i128>()?;
    let oracle_price = oracle.price;
    let reserve_price_2p5_bps = reserve_price / 4_000;
    let conf = oracle.confidence.cast::<i128>()?;

    let normalised = if reserve_price > oracle_price {
        min(
            max(reserve_price.safe_sub(reserve_price_2p5_bps)?, oracle_price),
            oracle_price.safe_add(conf)?,
        )
    } else {
        max(
            min(reserve_price.safe_add(reserve_price_2p5_bps)?, oracle_price),
            oracle_price.safe_sub(conf)?,
        )
    };
    Ok(normalised)
}

/// Decay `data1` by `weight1_numer / weight1_denom` and add `data2`
///
/// Used for the intensity and 24h volume accumulators.
pub fn calculate_rolling_sum(
    data1: u128,
    data2: u128,
    weight1_numer: i128,
    weight1_denom: i128,
) -> SimResult<u128> {
    let retained = max(0, weight1_denom.safe_sub(weight1_numer)?).cast::<u128>()?;
    data1
        .safe_mul(retained)?
        .safe_div(weight1_denom.cast::<u128>()?)?
        .safe_add(data2)
}

/// Oracle TWAP the authoritative engine would store if it updated at `now`
///
/// `period` selects the funding-period TWAP or, for [`FIVE_MINUTES`], the
/// short one. Invalid oracle samples leave the stored TWAP unchanged. If the
/// mark TWAP was updated more recently than the oracle TWAP (the oracle was
/// unusable in between), the sample is first shrunk toward the mark TWAP for
/// the invalid stretch.
pub fn calculate_live_oracle_twap(
    amm: &Amm,
    oracle: &OraclePriceData,
    reserve_price: u128,
    now: i64,
    period: i64,
) -> SimResult<i128> {
    let history = &amm.historical_oracle_data;
    let (last_mark_twap, last_oracle_twap) = if period == FIVE_MINUTES {
        (amm.last_mark_price_twap_5min, history.last_oracle_price_twap_5min)
    } else {
        (amm.last_mark_price_twap, history.last_oracle_price_twap)
    };

    if !oracle.is_valid() {
        return Ok(last_oracle_twap);
    }

    let normalised = normalise_oracle_price(reserve_price, oracle)?;
    let sample = sanitize_new_price(normalised, last_oracle_twap)?;
    if sample <= 0 {
        return Ok(last_oracle_twap);
    }

    let since_last = max(1, now.safe_sub(history.last_oracle_price_twap_ts)?).cast::<i128>()?;
    let from_start = max(0, period.cast::<i128>()?.safe_sub(since_last)?);

    let interpolated = if amm.last_mark_price_twap_ts > history.last_oracle_price_twap_ts {
        let since_last_valid = amm
            .last_mark_price_twap_ts
            .safe_sub(history.last_oracle_price_twap_ts)?
            .cast::<i128>()?;
        debug!(
            since_last_valid,
            "shrinking oracle sample toward mark twap after invalid stretch"
        );
        let from_start_valid = max(1, period.cast::<i128>()?.safe_sub(since_last_valid)?);
        calculate_weighted_average(
            last_mark_twap.cast::<i128>()?,
            sample,
            since_last_valid,
            from_start_valid,
        )?
    } else {
        sample
    };

    calculate_weighted_average(interpolated, last_oracle_twap, since_last, from_start)
}
