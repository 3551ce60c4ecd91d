//! Liquidity Merge Tests
//!
//! End-to-end behaviour of the walker over generated books:
//! - Any fillable request is filled exactly, in its own denomination
//! - The entry price lies between the best and worst prices of the walk
//! - Curve and order legs add up to the reported totals
//! - Requests beyond total liquidity fail instead of truncating

use perpsim_dlob::{
    calculate_estimated_entry_price, walk_liquidity, FillMode, FillRequest, FillResult,
};
use perpsim_types::fixtures::{ask, bid, oracle_at, reference_market, SNAPSHOT_TS};
use perpsim_types::{
    AssetAmount, Market, PositionDirection, RestingOrder, SimulationError, BASE_PRECISION,
    PRICE_PRECISION, QUOTE_PRECISION,
};
use proptest::prelude::*;
use std::collections::HashSet;

const COIN: u128 = BASE_PRECISION;
const CENT: u128 = PRICE_PRECISION / 100;
const PRICE_TOLERANCE: u128 = PRICE_PRECISION / 100_000;

prop_compose! {
    /// Up to six resting orders one to ten cents away from $1.00, best first
    fn book_side(direction: PositionDirection)
        (offsets in prop::collection::btree_set(1u128..=10, 0..6),
         sizes in prop::collection::vec(1u128..5_000, 6)) -> Vec<RestingOrder> {
        offsets
            .into_iter()
            .zip(sizes)
            .enumerate()
            .map(|(i, (offset, size))| match direction {
                PositionDirection::Long => ask(i as u32 + 1, (100 + offset) * CENT, size * COIN),
                PositionDirection::Short => bid(i as u32 + 1, (100 - offset) * CENT, size * COIN),
            })
            .collect()
    }
}

fn direction() -> impl Strategy<Value = PositionDirection> {
    prop_oneof![Just(PositionDirection::Long), Just(PositionDirection::Short)]
}

fn walk(market: &Market, request: FillRequest, orders: Vec<RestingOrder>) -> Result<FillResult, SimulationError> {
    walk_liquidity(
        &request,
        market,
        &oracle_at(PRICE_PRECISION),
        orders,
        &HashSet::new(),
        SNAPSHOT_TS,
    )
}

fn assert_entry_within_walk(fill: &FillResult, direction: PositionDirection) -> Result<(), TestCaseError> {
    let entry = fill.entry_price().unwrap();
    let (low, high) = match direction {
        PositionDirection::Long => (fill.best_price, fill.worst_price),
        PositionDirection::Short => (fill.worst_price, fill.best_price),
    };
    prop_assert!(entry + PRICE_TOLERANCE >= low, "entry {} below {}", entry, low);
    prop_assert!(entry <= high + PRICE_TOLERANCE, "entry {} above {}", entry, high);
    Ok(())
}

fn assert_legs_add_up(fill: &FillResult) -> Result<(), TestCaseError> {
    let order_base: u128 = fill.order_fills.iter().map(|f| f.base_asset_amount).sum();
    let order_quote: u128 = fill.order_fills.iter().map(|f| f.quote_asset_amount).sum();
    prop_assert_eq!(fill.amm_base_filled + order_base, fill.base_filled);
    prop_assert_eq!(fill.amm_quote_filled + order_quote, fill.quote_filled);
    Ok(())
}

proptest! {
    /// Property: a base request within the curve's open liquidity is filled exactly
    #[test]
    fn base_requests_fill_exactly(
        (direction, orders) in direction().prop_flat_map(|d| (Just(d), book_side(d))),
        coins in 1u128..200_000,
    ) {
        let request = FillRequest::exact(direction, AssetAmount::Base(coins * COIN));
        let fill = walk(&reference_market(), request, orders).unwrap();

        prop_assert_eq!(fill.base_filled, coins * COIN);
        assert_entry_within_walk(&fill, direction)?;
        assert_legs_add_up(&fill)?;
    }

    /// Property: a quote request stops on exactly the requested quote
    #[test]
    fn quote_requests_fill_exactly(
        (direction, orders) in direction().prop_flat_map(|d| (Just(d), book_side(d))),
        dollars in 1u128..100_000,
    ) {
        let request = FillRequest::exact(direction, AssetAmount::Quote(dollars * QUOTE_PRECISION));
        let fill = walk(&reference_market(), request, orders).unwrap();

        prop_assert_eq!(fill.quote_filled, dollars * QUOTE_PRECISION);
        assert_entry_within_walk(&fill, direction)?;
        assert_legs_add_up(&fill)?;
    }

    /// Property: orders are only consumed once the curve has reached their price
    #[test]
    fn orders_fill_in_price_priority(
        (direction, orders) in direction().prop_flat_map(|d| (Just(d), book_side(d))),
        coins in 1u128..20_000,
    ) {
        let request = FillRequest::exact(direction, AssetAmount::Base(coins * COIN));
        let fill = walk(&reference_market(), request, orders).unwrap();

        for pair in fill.order_fills.windows(2) {
            match direction {
                PositionDirection::Long => prop_assert!(pair[0].price <= pair[1].price),
                PositionDirection::Short => prop_assert!(pair[0].price >= pair[1].price),
            }
        }
        if let Some(last) = fill.order_fills.last() {
            match direction {
                PositionDirection::Long => prop_assert!(fill.worst_price >= last.price),
                PositionDirection::Short => prop_assert!(fill.worst_price <= last.price),
            }
        }
    }
}

fn thin_market() -> Market {
    let mut market = reference_market();
    // 1,000 coins of open asks
    market.amm.min_base_asset_reserve = market.amm.base_asset_reserve - 1_000 * COIN;
    market
}

#[test]
fn test_request_beyond_total_liquidity_fails() {
    let orders = vec![ask(1, 101 * CENT, 500 * COIN), ask(2, 103 * CENT, 250 * COIN)];
    let request = FillRequest::exact(PositionDirection::Long, AssetAmount::Base(2_000 * COIN));

    assert_eq!(
        walk(&thin_market(), request, orders),
        Err(SimulationError::InsufficientLiquidity {
            requested: 2_000 * COIN,
            filled: 1_750 * COIN,
        })
    );
}

#[test]
fn test_request_at_total_liquidity_fills() {
    let orders = vec![ask(1, 101 * CENT, 500 * COIN), ask(2, 103 * CENT, 250 * COIN)];
    let request = FillRequest::exact(PositionDirection::Long, AssetAmount::Base(1_750 * COIN));

    let fill = walk(&thin_market(), request, orders).unwrap();
    assert_eq!(fill.amm_base_filled, 1_000 * COIN);
    assert_eq!(fill.order_fills.len(), 2);
}

#[test]
fn test_partial_mode_reports_the_shortfall_as_a_fill() {
    let orders = vec![ask(1, 101 * CENT, 500 * COIN)];
    let request = FillRequest {
        direction: PositionDirection::Long,
        amount: AssetAmount::Base(2_000 * COIN),
        mode: FillMode::AllowPartial,
    };

    let fill = walk(&thin_market(), request, orders).unwrap();
    assert_eq!(fill.base_filled, 1_500 * COIN);
}

#[test]
fn test_entry_price_estimate_propagates_insufficient_liquidity() {
    let result = calculate_estimated_entry_price(
        PositionDirection::Long,
        AssetAmount::Base(1_001 * COIN),
        &thin_market(),
        &oracle_at(PRICE_PRECISION),
        Vec::new(),
        &HashSet::new(),
        SNAPSHOT_TS,
    );
    assert!(matches!(
        result,
        Err(SimulationError::InsufficientLiquidity { .. })
    ));
    assert_eq!(
        result.unwrap_err().category(),
        perpsim_types::ErrorCategory::InsufficientLiquidity
    );
}
