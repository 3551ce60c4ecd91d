//! Entry-price estimate for a taker order across the vAMM and the book

use crate::walker::{walk_liquidity, FillRequest, FillResult};
use perpsim_amm::CurveState;
use perpsim_types::{
    AssetAmount, Market, OraclePriceData, OwnerId, PositionDirection, RestingOrder, SafeMath,
    SimResult, SimulationError, PRICE_PRECISION,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Average price and impact of filling a whole request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPriceEstimate {
    pub entry_price: u128,
    /// `|entry − best| / best` in `PRICE_PRECISION`
    pub price_impact: u128,
    pub best_price: u128,
    pub worst_price: u128,
    pub base_filled: u128,
    pub quote_filled: u128,
}

impl EntryPriceEstimate {
    fn from_fill(fill: &FillResult) -> SimResult<Self> {
        let entry_price = fill.entry_price()?;
        if fill.best_price == 0 {
            return Err(SimulationError::invariant(
                "non-empty fill reported a zero best price",
            ));
        }
        let price_impact = entry_price
            .abs_diff(fill.best_price)
            .safe_mul(PRICE_PRECISION)?
            .safe_div(fill.best_price)?;

        Ok(Self {
            entry_price,
            price_impact,
            best_price: fill.best_price,
            worst_price: fill.worst_price,
            base_filled: fill.base_filled,
            quote_filled: fill.quote_filled,
        })
    }
}

/// Estimated entry price for `amount` in `direction`
///
/// The whole amount must be fillable. A zero amount is a no-op that reports
/// the unadjusted reserve price with zero size and zero impact.
pub fn calculate_estimated_entry_price<I>(
    direction: PositionDirection,
    amount: AssetAmount,
    market: &Market,
    oracle: &OraclePriceData,
    orders: I,
    excluded: &HashSet<OwnerId>,
    now: i64,
) -> SimResult<EntryPriceEstimate>
where
    I: IntoIterator<Item = RestingOrder>,
{
    if amount.is_zero() {
        market.validate()?;
        let reserve_price = CurveState::from_amm(&market.amm).reserve_price()?;
        return Ok(EntryPriceEstimate {
            entry_price: reserve_price,
            best_price: reserve_price,
            worst_price: reserve_price,
            ..Default::default()
        });
    }

    let request = FillRequest::exact(direction, amount);
    let fill = walk_liquidity(&request, market, oracle, orders, excluded, now)?;
    let estimate = EntryPriceEstimate::from_fill(&fill)?;

    debug!(
        %direction,
        entry_price = estimate.entry_price,
        price_impact = estimate.price_impact,
        base_filled = estimate.base_filled,
        quote_filled = estimate.quote_filled,
        "estimated entry price"
    );
    Ok(estimate)
}
