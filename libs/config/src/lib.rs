//! # perpsim Simulator Settings
//!
//! Caller-owned settings for the simulation engine. Nothing here is global:
//! callers load a [`SimulatorSettings`] value once and hand the relevant
//! section into each computation.
//!
//! ## Features
//!
//! - **L2 Depth**: level count, vAMM levels and top-of-book quote checkpoints
//! - **Trade Previews**: spread usage, solver completion and fill mode
//! - **Sources**: TOML file with `PERPSIM_`-prefixed environment overrides
//!
//! ## Usage
//!
//! ```rust
//! use perpsim_config::SimulatorSettings;
//!
//! let settings = SimulatorSettings::default();
//! assert_eq!(settings.l2.depth, 10);
//! assert!(settings.trade.use_spread);
//! ```

pub mod settings;

pub use settings::{
    load_settings, L2Settings, SimulatorSettings, TradeSettings, DEFAULT_ENV_PREFIX,
};
