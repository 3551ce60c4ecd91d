//! Settings-Driven Preview Tests
//!
//! Trade settings flow into the solver and the walker unchanged:
//! - `completion_pct` and `use_spread` parameterise the target-price solver
//! - `allow_partial_fills` selects the walker's fill mode

use perpsim_amm::calculate_target_price_trade;
use perpsim_config::SimulatorSettings;
use perpsim_dlob::{walk_liquidity, FillMode, FillRequest};
use perpsim_types::fixtures::{ask, oracle_at, reference_market, SNAPSHOT_TS};
use perpsim_types::{AssetAmount, PositionDirection, BASE_PRECISION, PRICE_PRECISION};
use std::collections::HashSet;

#[test]
fn test_solver_uses_configured_completion() {
    let settings = SimulatorSettings::from_toml_str(
        "[trade]\nuse_spread = false\ncompletion_pct = 0.5\n",
    )
    .unwrap();

    let trade = calculate_target_price_trade(
        &reference_market(),
        121 * PRICE_PRECISION / 100,
        settings.trade.completion_pct_raw().unwrap(),
        &oracle_at(PRICE_PRECISION),
        SNAPSHOT_TS,
        settings.trade.use_spread,
    )
    .unwrap();

    assert_eq!(trade.direction, PositionDirection::Long);
    assert_eq!(trade.target_price, 11_050_000_000);
    assert_eq!(trade.base_asset_amount, 243_485_058_455_059_210);
}

#[test]
fn test_walker_uses_configured_fill_mode() {
    let settings =
        SimulatorSettings::from_toml_str("[trade]\nallow_partial_fills = true\n").unwrap();
    let mut market = reference_market();
    market.amm.min_base_asset_reserve = market.amm.base_asset_reserve - 10 * BASE_PRECISION;

    let request = FillRequest {
        direction: PositionDirection::Long,
        amount: AssetAmount::Base(100 * BASE_PRECISION),
        mode: FillMode::from(&settings.trade),
    };
    let fill = walk_liquidity(
        &request,
        &market,
        &oracle_at(PRICE_PRECISION),
        vec![ask(1, 2 * PRICE_PRECISION, 5 * BASE_PRECISION)],
        &HashSet::new(),
        SNAPSHOT_TS,
    )
    .unwrap();

    assert_eq!(fill.base_filled, 15 * BASE_PRECISION);
    assert_eq!(fill.amm_base_filled, 10 * BASE_PRECISION);
}
