//! # perpsim DLOB Library - Merged vAMM and Order Book Liquidity
//!
//! ## Purpose
//!
//! Combines the spread-adjusted vAMM curve with resting limit orders: walking
//! a taker order through both sources, estimating its entry price and impact,
//! and building bounded L2 depth.
//!
//! ## Integration Points
//!
//! - **Input Sources**: market and oracle snapshots plus a best-first sequence
//!   of [`perpsim_types::RestingOrder`]s per side from the order-source
//!   collaborator
//! - **Curve Math**: every AMM leg goes through `perpsim-amm`, so fills match
//!   the curve engine exactly
//! - **Settings**: [`perpsim_config::L2Settings`] and
//!   [`perpsim_config::TradeSettings`] convert into [`L2BookParams`] and
//!   [`FillMode`]
//! - **Output Destinations**: trade previews and depth displays
//!
//! ## Architecture Role
//!
//! ```text
//! RestingOrder iterator ──► OrderCursor ──┐
//!                                         ├──► walker ──► entry_price
//! spread-adjusted CurveState ─────────────┤
//!                                         └──► l2 (vAMM levels + order levels ──► merge ──► group)
//! ```

pub mod cursor;
pub mod entry_price;
pub mod l2;
pub mod walker;

pub use cursor::{OrderCursor, OrderLevel};
pub use entry_price::{calculate_estimated_entry_price, EntryPriceEstimate};
pub use l2::{
    build_l2_book, group_l2_levels, merge_l2_levels, resting_order_levels, vamm_l2_levels,
    BookSide, L2BookParams, L2Level, L2OrderBook, LiquiditySources, VammL2Params,
};
pub use walker::{walk_liquidity, FillMode, FillRequest, FillResult, OrderFill};
