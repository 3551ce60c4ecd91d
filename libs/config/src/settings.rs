//! Simulator Settings Module
//!
//! Loads [`SimulatorSettings`] from a TOML file with environment overrides.
//! Human-facing values (quote checkpoints, ticks, percentages) are decimals;
//! the `*_raw` accessors convert them into the engine's fixed-point scales.

use anyhow::{ensure, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use perpsim_types::{Scale, SimResult, SimulationError, PERCENTAGE_PRECISION};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Prefix for environment overrides, e.g. `PERPSIM_L2__DEPTH=20`
pub const DEFAULT_ENV_PREFIX: &str = "PERPSIM";

/// Complete simulator configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub l2: L2Settings,
    pub trade: TradeSettings,
}

/// L2 depth construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct L2Settings {
    /// Maximum levels per side after merging
    pub depth: usize,

    /// Levels generated from the vAMM curve per side
    pub num_vamm_levels: usize,

    /// Quote amounts (whole units) swapped for the first vAMM levels, best first
    pub top_of_book_quote_amounts: Vec<Decimal>,

    /// Price bucket for grouped depth, `None` keeps raw prices
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping_tick: Option<Decimal>,
}

/// Trade preview behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeSettings {
    /// Quote against spread-adjusted reserves instead of the raw curve
    pub use_spread: bool,

    /// Fraction of the distance to a target price the solver covers, in (0, 1]
    pub completion_pct: Decimal,

    /// Return a partial fill instead of an insufficient-liquidity error
    pub allow_partial_fills: bool,
}

impl Default for L2Settings {
    fn default() -> Self {
        Self {
            depth: 10,
            num_vamm_levels: 10,
            top_of_book_quote_amounts: vec![
                Decimal::from(500),
                Decimal::from(1_000),
                Decimal::from(2_000),
                Decimal::from(5_000),
            ],
            grouping_tick: None,
        }
    }
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            use_spread: true,
            completion_pct: Decimal::ONE,
            allow_partial_fills: false,
        }
    }
}

impl L2Settings {
    /// Checkpoints in `QUOTE_PRECISION`
    pub fn top_of_book_quote_amounts_raw(&self) -> SimResult<Vec<u128>> {
        self.top_of_book_quote_amounts
            .iter()
            .map(|amount| non_negative(Scale::Quote, *amount, "top_of_book_quote_amounts"))
            .collect()
    }

    /// Grouping tick in `PRICE_PRECISION`; a tick that rounds to zero is rejected
    pub fn grouping_tick_raw(&self) -> SimResult<Option<u128>> {
        self.grouping_tick
            .map(|tick| {
                let raw = non_negative(Scale::Price, tick, "grouping_tick")?;
                if raw == 0 {
                    return Err(SimulationError::invalid_argument(format!(
                        "grouping tick {tick} is below one price unit"
                    )));
                }
                Ok(raw)
            })
            .transpose()
    }
}

impl TradeSettings {
    /// Completion in `PERCENTAGE_PRECISION`
    pub fn completion_pct_raw(&self) -> SimResult<u128> {
        let raw = Scale::Percentage.from_decimal(self.completion_pct)?;
        if raw <= 0 || raw > PERCENTAGE_PRECISION as i128 {
            return Err(SimulationError::InvalidPercentage {
                value: raw.max(0) as u128,
                max: PERCENTAGE_PRECISION,
            });
        }
        Ok(raw as u128)
    }
}

fn non_negative(scale: Scale, value: Decimal, field: &str) -> SimResult<u128> {
    let raw = scale.from_decimal(value)?;
    if raw < 0 {
        return Err(SimulationError::invalid_argument(format!(
            "{field} must not be negative, got {value}"
        )));
    }
    Ok(raw as u128)
}

impl SimulatorSettings {
    /// Load settings from `path` with `PERPSIM_` environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_prefix(path, DEFAULT_ENV_PREFIX)
    }

    /// Load settings from `path`, overriding keys from `{prefix}_SECTION__KEY` variables
    pub fn load_with_prefix(path: &Path, prefix: &str) -> Result<Self> {
        info!("Loading simulator settings: {:?}", path);

        let config = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build simulator configuration")?;

        let settings: Self = config
            .try_deserialize()
            .context("Failed to deserialize simulator configuration")?;
        settings.validate()?;

        debug!(?settings, "simulator settings loaded");
        Ok(settings)
    }

    /// Parse settings from a TOML document without environment overrides
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let settings: Self = toml::from_str(input).context("Failed to parse simulator settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Render settings as TOML, e.g. to write out the defaults
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize simulator settings")
    }

    /// Reject settings the engine cannot use
    pub fn validate(&self) -> Result<()> {
        ensure!(self.l2.depth > 0, "l2.depth must be at least 1");
        self.l2
            .top_of_book_quote_amounts_raw()
            .context("Invalid l2.top_of_book_quote_amounts")?;
        self.l2
            .grouping_tick_raw()
            .context("Invalid l2.grouping_tick")?;
        self.trade
            .completion_pct_raw()
            .context("Invalid trade.completion_pct")?;
        Ok(())
    }
}

/// Convenience wrapper around [`SimulatorSettings::load`] that falls back to
/// defaults when no path is given
pub fn load_settings(path: Option<&Path>) -> Result<SimulatorSettings> {
    match path {
        Some(path) => SimulatorSettings::load(path),
        None => Ok(SimulatorSettings::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpsim_types::{PRICE_PRECISION, QUOTE_PRECISION};
    use rust_decimal_macros::dec;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("perpsim.toml");

        let content = r#"
[l2]
depth = 5
num_vamm_levels = 8
top_of_book_quote_amounts = [250.0, 750.5]
grouping_tick = "0.01"

[trade]
use_spread = false
completion_pct = 0.5
"#;
        fs::write(&path, content).unwrap();

        let settings = SimulatorSettings::load_with_prefix(&path, "PERPSIM_TEST_FILE").unwrap();

        assert_eq!(settings.l2.depth, 5);
        assert_eq!(settings.l2.num_vamm_levels, 8);
        assert_eq!(
            settings.l2.top_of_book_quote_amounts_raw().unwrap(),
            vec![250 * QUOTE_PRECISION, 750_500_000]
        );
        assert_eq!(settings.l2.grouping_tick_raw().unwrap(), Some(PRICE_PRECISION / 100));
        assert!(!settings.trade.use_spread);
        assert_eq!(settings.trade.completion_pct_raw().unwrap(), 500_000);
        // missing keys keep their defaults
        assert!(!settings.trade.allow_partial_fills);
    }

    #[test]
    fn test_environment_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("perpsim.toml");
        fs::write(&path, "[l2]\ndepth = 5\n").unwrap();

        std::env::set_var("PERPSIM_TEST_ENV_L2__DEPTH", "25");
        std::env::set_var("PERPSIM_TEST_ENV_TRADE__ALLOW_PARTIAL_FILLS", "true");
        let settings = SimulatorSettings::load_with_prefix(&path, "PERPSIM_TEST_ENV").unwrap();
        std::env::remove_var("PERPSIM_TEST_ENV_L2__DEPTH");
        std::env::remove_var("PERPSIM_TEST_ENV_TRADE__ALLOW_PARTIAL_FILLS");

        assert_eq!(settings.l2.depth, 25);
        assert!(settings.trade.allow_partial_fills);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = SimulatorSettings::load_with_prefix(&dir.path().join("absent.toml"), "PERPSIM_TEST_MISSING");
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let defaults = SimulatorSettings::default();
        let rendered = defaults.to_toml_string().unwrap();
        assert_eq!(SimulatorSettings::from_toml_str(&rendered).unwrap(), defaults);
        assert_eq!(load_settings(None).unwrap(), defaults);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SimulatorSettings::from_toml_str("[trade]\ncompletion_pct = 1.5\n").is_err());
        assert!(SimulatorSettings::from_toml_str("[trade]\ncompletion_pct = 0\n").is_err());
        assert!(SimulatorSettings::from_toml_str("[l2]\ndepth = 0\n").is_err());
        assert!(SimulatorSettings::from_toml_str("[l2]\ntop_of_book_quote_amounts = [-1]\n").is_err());
        assert!(SimulatorSettings::from_toml_str("[l2]\ngrouping_tick = \"0.00000000001\"\n").is_err());
    }

    #[test]
    fn test_completion_pct_bounds() {
        let mut trade = TradeSettings::default();
        assert_eq!(trade.completion_pct_raw().unwrap(), PERCENTAGE_PRECISION);

        trade.completion_pct = dec!(-0.1);
        assert_eq!(
            trade.completion_pct_raw(),
            Err(SimulationError::InvalidPercentage {
                value: 0,
                max: PERCENTAGE_PRECISION,
            })
        );
    }
}
