//! # perpsim AMM Library - Virtual AMM Mathematics
//!
//! ## Purpose
//!
//! Read-only simulation of a perpetual-futures virtual AMM: constant-product
//! swaps, the per-side spread model, TWAP and funding estimates, and the
//! target-price trade solver. Every computation takes an immutable market
//! snapshot and returns new values; nothing is written back.
//!
//! ## Integration Points
//!
//! - **Input Sources**: [`perpsim_types::Market`] and
//!   [`perpsim_types::OraclePriceData`] snapshots decoded by collaborators
//! - **Output Destinations**: `perpsim-dlob` (AMM leg of the liquidity walker
//!   and L2 depth), trade-preview and funding-preview callers
//! - **Precision**: Scaled integers only, wide intermediates in
//!   [`perpsim_types::U192`], results truncated unless documented otherwise
//! - **Validation**: Snapshots are validated on entry; malformed inputs are
//!   precondition errors, never panics
//!
//! ## Architecture Role
//!
//! ```text
//! curve   ── constant-product swaps, reserve/price conversions
//!   │
//! spread  ── per-side spreads and spread-adjusted curves
//!   │
//! twap ─ funding ── live TWAPs and the next funding rate
//!   │
//! trade   ── slippage previews and the target-price solver
//! ```

pub mod curve;
pub mod funding;
pub mod spread;
pub mod trade;
pub mod twap;

pub use curve::{
    base_reserve_at_price, base_reserve_squared_at_price, calculate_base_asset_amount_to_trade_to_price,
    calculate_market_open_bids_asks, calculate_max_base_asset_amount_fillable,
    calculate_peg_from_target_price, calculate_price, calculate_quote_asset_amount_swapped,
    calculate_swap_output, calculate_terminal_price_and_reserves, get_swap_direction,
    reserve_to_quote_amount, standardize_base_asset_amount, CurveState, SwapResult,
};
pub use funding::{
    calculate_capped_funding_rate, calculate_funding_estimate, calculate_funding_payment,
    calculate_funding_pool, calculate_live_mark_twap, calculate_long_short_funding_rates,
    funding_rate_as_percentage, FundingEstimate,
};
pub use spread::{
    calculate_bid_ask_curves, calculate_bid_ask_price, calculate_spread, calculate_spread_reserves,
    calculate_spreads, calculate_updated_amm_spread_reserves, SpreadTerms, Spreads,
};
pub use trade::{
    calculate_target_price_trade, calculate_taker_fee, calculate_trade_acquired_amounts,
    calculate_trade_slippage, TargetPriceTrade, TradeAcquired, TradeSlippage,
};
pub use twap::{calculate_live_oracle_twap, calculate_new_twap, calculate_weighted_average};
