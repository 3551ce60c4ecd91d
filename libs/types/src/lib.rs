//! # perpsim Types Library
//!
//! Fixed-point numeric layer and decoded snapshot entities shared by every
//! perpsim engine crate.
//!
//! ## Design Philosophy
//!
//! - **No Floating Point**: Prices, reserves and rates are scaled integers with
//!   explicit precision constants (see [`precision`])
//! - **Checked Arithmetic**: Every intermediate goes through [`SafeMath`]; wide
//!   products use [`U192`]
//! - **Immutable Snapshots**: [`Market`], [`OraclePriceData`] and [`RestingOrder`]
//!   are read-only inputs supplied by collaborators for a single call
//! - **Clear Boundaries**: [`Scale`] converts between raw integers and
//!   [`rust_decimal::Decimal`] for display and configuration
//!
//! ## Quick Start
//!
//! ```rust
//! use perpsim_types::{Scale, PRICE_PRECISION};
//!
//! let price = Scale::Price.from_decimal_str("42.5").unwrap();
//! assert_eq!(price, 425 * PRICE_PRECISION as i128 / 10);
//! ```
//!
//! ## Integration Points
//!
//! - **Input Sources**: account-state and order-source collaborators hand over
//!   decoded snapshots (serde-deserializable)
//! - **Output Destinations**: `perpsim-amm` and `perpsim-dlob` computations

pub mod common;
pub mod market;
pub mod oracle;
pub mod order;
pub mod precision;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use common::errors::{ErrorCategory, SimResult, SimulationError};
pub use common::fixed_point::{Cast, SafeDivCeil, SafeMath, U192Ext, U192};
pub use market::{
    AssetAmount, AssetType, Amm, FeeTier, Market, PositionDirection, SwapDirection,
};
pub use oracle::{HistoricalOracleData, OraclePriceData};
pub use order::{OrderPrice, OwnerId, RestingOrder};
pub use precision::*;
