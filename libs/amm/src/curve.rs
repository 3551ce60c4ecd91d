//! Constant-product curve engine
//!
//! The virtual AMM quotes from two reserves whose product is pinned to
//! `sqrt_k²`. A swap moves one reserve by the traded amount and recomputes the
//! other by floor division, so the product after a swap never exceeds the
//! invariant and falls short of it by less than the new input reserve.
//!
//! Quote-denominated amounts are rescaled by the peg before they reach the
//! curve (see [`AssetAmount::to_reserve_amount`]).

use perpsim_types::{
    Amm, AssetAmount, AssetType, Cast, PositionDirection, SafeMath, SimResult, SimulationError,
    SwapDirection, U192Ext, U192, AMM_TIMES_PEG_TO_QUOTE_PRECISION_RATIO, PEG_PRECISION,
    PRICE_PRECISION, PRICE_TO_PEG_PRECISION_RATIO,
};
use serde::{Deserialize, Serialize};
use std::cmp::min;

/// Reserves and peg the curve functions operate on
///
/// Either the market's raw reserves or a spread-adjusted copy of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveState {
    pub base_asset_reserve: u128,
    pub quote_asset_reserve: u128,
    pub sqrt_k: u128,
    pub peg_multiplier: u128,
}

/// Outcome of executing one swap against a [`CurveState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapResult {
    /// Curve after the swap
    pub curve: CurveState,
    /// Base moved in or out of the curve
    pub base_asset_amount: u128,
    /// Quote paid or received, `QUOTE_PRECISION`
    pub quote_asset_amount: u128,
}

impl CurveState {
    pub fn from_amm(amm: &Amm) -> Self {
        Self {
            base_asset_reserve: amm.base_asset_reserve,
            quote_asset_reserve: amm.quote_asset_reserve,
            sqrt_k: amm.sqrt_k,
            peg_multiplier: amm.peg_multiplier,
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        for (field, value) in [
            ("base_asset_reserve", self.base_asset_reserve),
            ("quote_asset_reserve", self.quote_asset_reserve),
            ("sqrt_k", self.sqrt_k),
            ("peg_multiplier", self.peg_multiplier),
        ] {
            if value == 0 {
                return Err(SimulationError::NonPositiveReserve { field });
            }
        }
        Ok(())
    }

    /// `sqrt_k²`
    pub fn invariant(&self) -> SimResult<U192> {
        let sqrt_k = U192::from(self.sqrt_k);
        sqrt_k.safe_mul(sqrt_k)
    }

    pub fn reserve_price(&self) -> SimResult<u128> {
        calculate_price(
            self.quote_asset_reserve,
            self.base_asset_reserve,
            self.peg_multiplier,
        )
    }

    /// `(quote_reserve, base_reserve)` after swapping `amount` in `direction`
    pub fn reserves_after_swap(
        &self,
        amount: AssetAmount,
        direction: SwapDirection,
    ) -> SimResult<(u128, u128)> {
        let reserve_amount = amount.to_reserve_amount(self.peg_multiplier, direction)?;
        match amount.asset_type() {
            AssetType::Base => calculate_swap_output(
                reserve_amount,
                self.base_asset_reserve,
                direction,
                self.sqrt_k,
            ),
            AssetType::Quote => {
                let (new_base, new_quote) = calculate_swap_output(
                    reserve_amount,
                    self.quote_asset_reserve,
                    direction,
                    self.sqrt_k,
                )?;
                Ok((new_quote, new_base))
            }
        }
    }

    /// Execute a swap and report both legs in user-facing precision
    ///
    /// For base input the quote leg comes from
    /// [`calculate_quote_asset_amount_swapped`]; for quote input it is the
    /// input amount itself.
    pub fn swap(&self, amount: AssetAmount, direction: SwapDirection) -> SimResult<SwapResult> {
        let (quote_asset_reserve, base_asset_reserve) = self.reserves_after_swap(amount, direction)?;
        let curve = CurveState {
            base_asset_reserve,
            quote_asset_reserve,
            ..*self
        };

        let (base_asset_amount, quote_asset_amount) = match amount {
            AssetAmount::Base(base) => (
                base,
                calculate_quote_asset_amount_swapped(
                    self.quote_asset_reserve,
                    quote_asset_reserve,
                    direction,
                    self.peg_multiplier,
                )?,
            ),
            AssetAmount::Quote(quote) => (
                self.base_asset_reserve.abs_diff(base_asset_reserve),
                quote,
            ),
        };

        Ok(SwapResult {
            curve,
            base_asset_amount,
            quote_asset_amount,
        })
    }
}

/// Reserve movement for a user trading `asset` in `direction`
pub fn get_swap_direction(asset: AssetType, direction: PositionDirection) -> SwapDirection {
    asset.swap_direction(direction)
}

/// Constant-product step
///
/// Returns `(new_output_reserve, new_input_reserve)`. Removing the whole input
/// reserve, or adding so much that the output reserve floors to zero, would
/// leave a non-positive reserve and is rejected.
pub fn calculate_swap_output(
    swap_amount: u128,
    input_asset_reserve: u128,
    direction: SwapDirection,
    invariant_sqrt: u128,
) -> SimResult<(u128, u128)> {
    let invariant_sqrt = U192::from(invariant_sqrt);
    let invariant = invariant_sqrt.safe_mul(invariant_sqrt)?;

    let new_input_asset_reserve = match direction {
        SwapDirection::Add => input_asset_reserve.safe_add(swap_amount)?,
        SwapDirection::Remove => {
            if swap_amount >= input_asset_reserve {
                return Err(SimulationError::ReserveExhausted {
                    amount: swap_amount,
                    reserve: input_asset_reserve,
                });
            }
            input_asset_reserve - swap_amount
        }
    };

    let new_output_asset_reserve = invariant
        .safe_div(U192::from(new_input_asset_reserve))?
        .try_to_u128()?;
    if new_output_asset_reserve == 0 {
        return Err(SimulationError::ReserveExhausted {
            amount: swap_amount,
            reserve: input_asset_reserve,
        });
    }

    Ok((new_output_asset_reserve, new_input_asset_reserve))
}

/// Quote asset amount for a quote reserve change caused by a base swap
///
/// `swap_direction` is the base reserve movement. Removing base (a long
/// taker) costs one extra quote unit.
pub fn calculate_quote_asset_amount_swapped(
    quote_asset_reserve_before: u128,
    quote_asset_reserve_after: u128,
    swap_direction: SwapDirection,
    peg_multiplier: u128,
) -> SimResult<u128> {
    let quote_asset_reserve_change = match swap_direction {
        SwapDirection::Add => quote_asset_reserve_before.safe_sub(quote_asset_reserve_after)?,
        SwapDirection::Remove => quote_asset_reserve_after.safe_sub(quote_asset_reserve_before)?,
    };

    let quote_asset_amount = reserve_to_quote_amount(quote_asset_reserve_change, peg_multiplier)?;
    match swap_direction {
        SwapDirection::Remove => quote_asset_amount.safe_add(1),
        SwapDirection::Add => Ok(quote_asset_amount),
    }
}

/// Quote reserve units to `QUOTE_PRECISION`, truncating
pub fn reserve_to_quote_amount(quote_asset_reserve_amount: u128, peg_multiplier: u128) -> SimResult<u128> {
    U192::from(quote_asset_reserve_amount)
        .safe_mul(U192::from(peg_multiplier))?
        .safe_div(U192::from(AMM_TIMES_PEG_TO_QUOTE_PRECISION_RATIO))?
        .try_to_u128()
}

/// `quote × peg × PRICE_TO_PEG_PRECISION_RATIO / base`
pub fn calculate_price(
    quote_asset_reserve: u128,
    base_asset_reserve: u128,
    peg_multiplier: u128,
) -> SimResult<u128> {
    if base_asset_reserve == 0 {
        return Err(SimulationError::NonPositiveReserve {
            field: "base_asset_reserve",
        });
    }
    U192::from(quote_asset_reserve)
        .safe_mul(U192::from(peg_multiplier))?
        .safe_mul(U192::from(PRICE_TO_PEG_PRECISION_RATIO))?
        .safe_div(U192::from(base_asset_reserve))?
        .try_to_u128()
}

/// Base the AMM can still give up (`asks`) or absorb (`bids`) before hitting its bounds
///
/// Returns `(open_bids, open_asks)` as magnitudes. Either side is zeroed
/// when half of it would not cover one order step.
pub fn calculate_market_open_bids_asks(
    base_asset_reserve: u128,
    min_base_asset_reserve: u128,
    max_base_asset_reserve: u128,
    step_size: u128,
) -> SimResult<(u128, u128)> {
    let below_step = |amount: u128| step_size > 0 && amount / 2 < step_size;

    let open_bids = max_base_asset_reserve.saturating_sub(base_asset_reserve);
    let open_asks = base_asset_reserve.saturating_sub(min_base_asset_reserve);

    Ok((
        if below_step(open_bids) { 0 } else { open_bids },
        if below_step(open_asks) { 0 } else { open_asks },
    ))
}

/// Price and reserves once every open user position is closed against the curve
///
/// Returns `(terminal_price, quote_reserve, base_reserve)`.
pub fn calculate_terminal_price_and_reserves(amm: &Amm) -> SimResult<(u128, u128, u128)> {
    let direction = if amm.base_asset_amount_with_amm > 0 {
        SwapDirection::Add
    } else {
        SwapDirection::Remove
    };
    let (quote_asset_reserve, base_asset_reserve) = calculate_swap_output(
        amm.base_asset_amount_with_amm.unsigned_abs(),
        amm.base_asset_reserve,
        direction,
        amm.sqrt_k,
    )?;
    let terminal_price = calculate_price(quote_asset_reserve, base_asset_reserve, amm.peg_multiplier)?;
    Ok((terminal_price, quote_asset_reserve, base_asset_reserve))
}

/// `sqrt_k² × PRICE_PRECISION / price × peg / PEG_PRECISION`, the square of the
/// base reserve at which the curve quotes `price`
pub fn base_reserve_squared_at_price(sqrt_k: u128, peg_multiplier: u128, price: u128) -> SimResult<U192> {
    if price == 0 {
        return Err(SimulationError::NonPositivePrice {
            field: "price",
            price: 0,
        });
    }
    let sqrt_k = U192::from(sqrt_k);
    sqrt_k
        .safe_mul(sqrt_k)?
        .safe_mul(U192::from(PRICE_PRECISION))?
        .safe_div(U192::from(price))?
        .safe_mul(U192::from(peg_multiplier))?
        .safe_div(U192::from(PEG_PRECISION))
}

/// Base reserve at which the curve quotes `price` (integer square root, floored)
pub fn base_reserve_at_price(sqrt_k: u128, peg_multiplier: u128, price: u128) -> SimResult<u128> {
    base_reserve_squared_at_price(sqrt_k, peg_multiplier, price)?
        .integer_sqrt()
        .try_to_u128()
}

/// Base amount and direction that move `curve` to `limit_price`
pub fn calculate_base_asset_amount_to_trade_to_price(
    curve: &CurveState,
    limit_price: u128,
) -> SimResult<(u128, PositionDirection)> {
    let new_base_asset_reserve = base_reserve_at_price(curve.sqrt_k, curve.peg_multiplier, limit_price)?;

    if new_base_asset_reserve > curve.base_asset_reserve {
        Ok((
            new_base_asset_reserve - curve.base_asset_reserve,
            PositionDirection::Short,
        ))
    } else {
        Ok((
            curve.base_asset_reserve - new_base_asset_reserve,
            PositionDirection::Long,
        ))
    }
}

/// Largest base fill the AMM accepts in one trade
///
/// Bounded by `base_reserve / max_base_asset_amount_ratio` and by half of the
/// open liquidity on the requested side, then rounded down to the step size.
pub fn calculate_max_base_asset_amount_fillable(
    amm: &Amm,
    direction: PositionDirection,
    max_base_asset_amount_ratio: u128,
) -> SimResult<u128> {
    if max_base_asset_amount_ratio == 0 {
        return Err(SimulationError::invalid_argument(
            "max_base_asset_amount_ratio must be positive",
        ));
    }
    let max_fill_size = amm.base_asset_reserve / max_base_asset_amount_ratio;

    let max_on_side = match direction {
        PositionDirection::Long => amm
            .base_asset_reserve
            .saturating_sub(amm.min_base_asset_reserve)
            / 2,
        PositionDirection::Short => amm
            .max_base_asset_reserve
            .saturating_sub(amm.base_asset_reserve)
            / 2,
    };

    Ok(standardize_base_asset_amount(
        min(max_fill_size, max_on_side),
        amm.order_step_size,
    ))
}

/// Round `base_asset_amount` down to a multiple of `step_size`
pub fn standardize_base_asset_amount(base_asset_amount: u128, step_size: u128) -> u128 {
    if step_size == 0 {
        return base_asset_amount;
    }
    base_asset_amount - base_asset_amount % step_size
}

/// Peg that makes the curve quote `target_price`, rounded to nearest, at least 1
pub fn calculate_peg_from_target_price(
    quote_asset_reserve: u128,
    base_asset_reserve: u128,
    target_price: u128,
) -> SimResult<u128> {
    if quote_asset_reserve == 0 {
        return Err(SimulationError::NonPositiveReserve {
            field: "quote_asset_reserve",
        });
    }
    let half_ratio = U192::from(PRICE_TO_PEG_PRECISION_RATIO / 2);
    let new_peg = U192::from(target_price)
        .safe_mul(U192::from(base_asset_reserve))?
        .safe_div(U192::from(quote_asset_reserve))?
        .safe_add(half_ratio)?
        .safe_div(U192::from(PRICE_TO_PEG_PRECISION_RATIO))?
        .try_to_u128()?;
    Ok(new_peg.max(1))
}

/// Signed reserve difference `after - before` as i128
pub(crate) fn signed_delta(before: u128, after: u128) -> SimResult<i128> {
    after.cast::<i128>()?.safe_sub(before.cast::<i128>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpsim_types::fixtures::{reference_market, FIXTURE_RESERVE};
    use perpsim_types::{AMM_RESERVE_PRECISION, QUOTE_PRECISION};

    fn reference_curve() -> CurveState {
        CurveState::from_amm(&reference_market().amm)
    }

    #[test]
    fn test_reference_trade_matches_authoritative_fill() {
        // 10 quote collateral at 5x leverage less the 0.1% fee
        let curve = reference_curve();
        let swap = curve
            .swap(AssetAmount::Quote(49_750_000), SwapDirection::Add)
            .unwrap();
        assert_eq!(swap.base_asset_amount, 497_450_503_674_885);
        assert_eq!(swap.quote_asset_amount, 49_750_000);
        assert_eq!(swap.curve.reserve_price().unwrap(), 10_001_990_099);
    }

    #[test]
    fn test_base_swaps_report_quote_legs() {
        let curve = reference_curve();
        let long = curve
            .swap(AssetAmount::Base(10_000 * AMM_RESERVE_PRECISION), SwapDirection::Remove)
            .unwrap();
        assert_eq!(long.curve.quote_asset_reserve, 5_102_040_816_326_530_612);
        // one extra quote unit charged on removal
        assert_eq!(long.quote_asset_amount, 10_204_081_633);

        let short = curve
            .swap(AssetAmount::Base(10_000 * AMM_RESERVE_PRECISION), SwapDirection::Add)
            .unwrap();
        assert_eq!(short.quote_asset_amount, 9_803_921_568);
    }

    #[test]
    fn test_swap_preserves_invariant_within_one_input_unit() {
        let curve = reference_curve();
        let invariant = curve.invariant().unwrap();
        let (quote, base) = curve
            .reserves_after_swap(AssetAmount::Base(123_456_789_012_345), SwapDirection::Add)
            .unwrap();
        let product = U192::from(quote) * U192::from(base);
        assert!(product <= invariant);
        assert!(invariant - product < U192::from(base));
    }

    #[test]
    fn test_removing_the_whole_reserve_is_rejected() {
        let err = calculate_swap_output(FIXTURE_RESERVE, FIXTURE_RESERVE, SwapDirection::Remove, FIXTURE_RESERVE)
            .unwrap_err();
        assert_eq!(
            err,
            SimulationError::ReserveExhausted {
                amount: FIXTURE_RESERVE,
                reserve: FIXTURE_RESERVE
            }
        );
        // zero amount is a no-op
        assert_eq!(
            calculate_swap_output(0, FIXTURE_RESERVE, SwapDirection::Remove, FIXTURE_RESERVE).unwrap(),
            (FIXTURE_RESERVE, FIXTURE_RESERVE)
        );
    }

    #[test]
    fn test_removing_quote_rounds_reserve_amount_up() {
        let mut curve = reference_curve();
        curve.peg_multiplier = 3_000;
        let add = curve.reserves_after_swap(AssetAmount::Quote(1), SwapDirection::Add).unwrap();
        let remove = curve.reserves_after_swap(AssetAmount::Quote(1), SwapDirection::Remove).unwrap();
        assert_eq!(add.0 - FIXTURE_RESERVE, 3_333_333);
        assert_eq!(FIXTURE_RESERVE - remove.0, 3_333_334);
    }

    #[test]
    fn test_price_and_bounds() {
        assert_eq!(reference_curve().reserve_price().unwrap(), PRICE_PRECISION);
        assert!(calculate_price(1, 0, 1).is_err());

        assert_eq!(
            calculate_market_open_bids_asks(100, 40, 180, 0).unwrap(),
            (80, 60)
        );
        // 60 / 2 < 31 zeroes the ask side only
        assert_eq!(
            calculate_market_open_bids_asks(100, 40, 180, 31).unwrap(),
            (80, 0)
        );
        assert_eq!(
            calculate_market_open_bids_asks(100, 100, 100, 1).unwrap(),
            (0, 0)
        );
    }

    #[test]
    fn test_trade_to_price_in_both_directions() {
        let curve = reference_curve();
        assert_eq!(
            calculate_base_asset_amount_to_trade_to_price(&curve, 121 * PRICE_PRECISION / 100).unwrap(),
            (454_545_454_545_454_546, PositionDirection::Long)
        );
        assert_eq!(
            calculate_base_asset_amount_to_trade_to_price(&curve, 81 * PRICE_PRECISION / 100).unwrap(),
            (555_555_555_555_555_555, PositionDirection::Short)
        );
        assert!(calculate_base_asset_amount_to_trade_to_price(&curve, 0).is_err());
    }

    #[test]
    fn test_terminal_price_of_flat_market_is_reserve_price() {
        let amm = reference_market().amm;
        let (price, quote, base) = calculate_terminal_price_and_reserves(&amm).unwrap();
        assert_eq!(price, PRICE_PRECISION);
        assert_eq!((quote, base), (FIXTURE_RESERVE, FIXTURE_RESERVE));

        let mut long_heavy = amm;
        long_heavy.base_asset_amount_with_amm = 10_000 * AMM_RESERVE_PRECISION as i128;
        long_heavy.base_asset_reserve -= 10_000 * AMM_RESERVE_PRECISION;
        let (terminal, _, base) = calculate_terminal_price_and_reserves(&long_heavy).unwrap();
        assert_eq!(base, FIXTURE_RESERVE);
        assert!(terminal > 0);
    }

    #[test]
    fn test_fillable_size_respects_ratio_side_and_step() {
        let mut amm = reference_market().amm;
        amm.order_step_size = AMM_RESERVE_PRECISION;
        let long = calculate_max_base_asset_amount_fillable(&amm, PositionDirection::Long, 4).unwrap();
        // reserve / 4 and half the open asks coincide
        assert_eq!(long, FIXTURE_RESERVE / 4);
        let short = calculate_max_base_asset_amount_fillable(&amm, PositionDirection::Short, 1_000).unwrap();
        assert_eq!(short, FIXTURE_RESERVE / 1_000);
        assert_eq!(short % AMM_RESERVE_PRECISION, 0);
        assert!(calculate_max_base_asset_amount_fillable(&amm, PositionDirection::Long, 0).is_err());

        assert_eq!(standardize_base_asset_amount(1_234, 100), 1_200);
        assert_eq!(standardize_base_asset_amount(1_234, 0), 1_234);
    }

    #[test]
    fn test_peg_from_target_price_rounds_to_nearest() {
        assert_eq!(
            calculate_peg_from_target_price(FIXTURE_RESERVE, FIXTURE_RESERVE, 15 * PRICE_PRECISION / 10).unwrap(),
            1_500
        );
        assert_eq!(calculate_peg_from_target_price(FIXTURE_RESERVE, FIXTURE_RESERVE, 1).unwrap(), 1);
        assert_eq!(
            reserve_to_quote_amount(AMM_TIMES_PEG_TO_QUOTE_PRECISION_RATIO * QUOTE_PRECISION, 1_000).unwrap(),
            1_000 * QUOTE_PRECISION
        );
    }
}
