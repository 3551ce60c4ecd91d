//! L2 Book Tests
//!
//! Depth built from loaded settings:
//! - Settings convert into book parameters
//! - Both sides stay in price priority and within depth
//! - Every level's size is fully attributed to its sources

use perpsim_config::SimulatorSettings;
use perpsim_dlob::{build_l2_book, BookSide, L2BookParams, L2Level};
use perpsim_types::fixtures::{ask, bid, maker, oracle_at, spread_market, SNAPSHOT_TS};
use perpsim_types::{BASE_PRECISION, PRICE_PRECISION};
use std::collections::HashSet;

const COIN: u128 = BASE_PRECISION;
const CENT: u128 = PRICE_PRECISION / 100;

const SETTINGS: &str = r#"
[l2]
depth = 6
num_vamm_levels = 8
top_of_book_quote_amounts = [100, 500, 1000]
"#;

fn assert_side(levels: &[L2Level], side: BookSide, depth: usize) {
    assert!(!levels.is_empty());
    assert!(levels.len() <= depth);
    for pair in levels.windows(2) {
        match side {
            BookSide::Bid => assert!(pair[0].price > pair[1].price),
            BookSide::Ask => assert!(pair[0].price < pair[1].price),
        }
    }
    for level in levels {
        assert!(level.size > 0);
        assert_eq!(level.sources.amm + level.sources.dlob, level.size);
    }
}

#[test]
fn test_book_from_settings() {
    let settings = SimulatorSettings::from_toml_str(SETTINGS).unwrap();
    let params = L2BookParams::try_from(&settings.l2).unwrap();
    assert_eq!(params.vamm.top_of_book_quote_amounts.len(), 3);

    let bids = vec![bid(1, 99 * CENT, 50 * COIN), bid(2, 98 * CENT, 50 * COIN)];
    let asks = vec![ask(3, 101 * CENT, 50 * COIN), ask(4, 102 * CENT, 50 * COIN)];
    let book = build_l2_book(
        &spread_market(),
        &oracle_at(PRICE_PRECISION),
        SNAPSHOT_TS,
        bids,
        asks,
        &HashSet::new(),
        &params,
    )
    .unwrap();

    assert_side(&book.bids, BookSide::Bid, params.depth);
    assert_side(&book.asks, BookSide::Ask, params.depth);

    // the spread keeps the touch off the oracle price
    let best_bid = book.best_bid().unwrap().price;
    let best_ask = book.best_ask().unwrap().price;
    assert!(best_bid < PRICE_PRECISION);
    assert!(best_ask > PRICE_PRECISION);

    let dlob_asks: u128 = book.asks.iter().map(|level| level.sources.dlob).sum();
    assert_eq!(dlob_asks, 100 * COIN);
}

#[test]
fn test_excluded_owner_has_no_depth() {
    let settings = SimulatorSettings::from_toml_str(SETTINGS).unwrap();
    let params = L2BookParams::try_from(&settings.l2).unwrap();

    let book = build_l2_book(
        &spread_market(),
        &oracle_at(PRICE_PRECISION),
        SNAPSHOT_TS,
        vec![bid(1, 99 * CENT, 50 * COIN)],
        Vec::new(),
        &HashSet::from([maker(1)]),
        &params,
    )
    .unwrap();

    assert!(book.bids.iter().all(|level| level.sources.dlob == 0));
    assert!(book.asks.iter().all(|level| level.sources.dlob == 0));
}

#[test]
fn test_grouped_book_from_settings() {
    let settings =
        SimulatorSettings::from_toml_str(&format!("{SETTINGS}grouping_tick = \"0.05\"\n")).unwrap();
    let params = L2BookParams::try_from(&settings.l2).unwrap();
    assert_eq!(params.grouping_tick, Some(5 * CENT));

    let book = build_l2_book(
        &spread_market(),
        &oracle_at(PRICE_PRECISION),
        SNAPSHOT_TS,
        Vec::new(),
        vec![ask(1, 101 * CENT, 50 * COIN)],
        &HashSet::new(),
        &params,
    )
    .unwrap();

    assert_side(&book.asks, BookSide::Ask, params.depth);
    assert!(book.asks.iter().all(|level| level.price % (5 * CENT) == 0));
    assert!(book.bids.iter().all(|level| level.price % (5 * CENT) == 0));
}
