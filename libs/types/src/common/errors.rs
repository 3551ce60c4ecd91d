//! Error taxonomy for the simulation engine
//!
//! Every fallible computation returns [`SimResult`]. Variants fall into three
//! categories (see [`ErrorCategory`]): precondition violations rejected before
//! a number is produced, insufficient liquidity as an expected trading outcome,
//! and invariant violations that indicate a defect inside the engine.

use std::panic::Location;
use thiserror::Error;
use tracing::error;

/// Result alias used by every perpsim computation
pub type SimResult<T> = std::result::Result<T, SimulationError>;

/// Coarse classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid input; fix the request, never retried
    Precondition,
    /// Requested size exceeds curve plus resting-order depth
    InsufficientLiquidity,
    /// Internal consistency check failed; a bug, not a market condition
    InvariantViolation,
}

/// Errors produced by the simulation engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimulationError {
    /// A curve reserve, the sqrt invariant or the peg is zero
    #[error("{field} must be strictly positive")]
    NonPositiveReserve { field: &'static str },

    /// A swap would drive a reserve to zero or below
    #[error("swap of {amount} against reserve {reserve} would exhaust the curve")]
    ReserveExhausted { amount: u128, reserve: u128 },

    /// Target, limit or oracle price is zero or negative
    #[error("{field} must be strictly positive, got {price}")]
    NonPositivePrice { field: &'static str, price: i128 },

    /// Percentage argument outside (0, max]
    #[error("percentage {value} outside (0, {max}]")]
    InvalidPercentage { value: u128, max: u128 },

    /// Resting orders were not supplied best price first
    #[error("resting orders out of price priority: {previous} followed by {next}")]
    UnsortedOrders { previous: u128, next: u128 },

    /// Any other malformed request or snapshot
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Checked arithmetic overflowed, underflowed or divided by zero
    #[error("arithmetic overflow at {location}")]
    MathOverflow { location: &'static Location<'static> },

    /// Requested amount exceeds the liquidity available across both sources
    #[error("insufficient liquidity: requested {requested}, only {filled} fillable")]
    InsufficientLiquidity { requested: u128, filled: u128 },

    /// Internal consistency check failed
    #[error("invariant violated: {details}")]
    InvariantViolation { details: String },
}

impl SimulationError {
    /// Category used by callers to decide between "fix input", "reduce size" and "report bug"
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InsufficientLiquidity { .. } => ErrorCategory::InsufficientLiquidity,
            Self::InvariantViolation { .. } => ErrorCategory::InvariantViolation,
            Self::NonPositiveReserve { .. }
            | Self::ReserveExhausted { .. }
            | Self::NonPositivePrice { .. }
            | Self::InvalidPercentage { .. }
            | Self::UnsortedOrders { .. }
            | Self::InvalidArgument { .. }
            | Self::MathOverflow { .. } => ErrorCategory::Precondition,
        }
    }

    /// Overflow error tagged with the location of the failing checked operation
    #[track_caller]
    pub fn math_overflow() -> Self {
        Self::MathOverflow {
            location: Location::caller(),
        }
    }

    /// Invariant violation; logged at error level since it always means a defect
    pub fn invariant(details: impl Into<String>) -> Self {
        let details = details.into();
        error!(%details, "simulation invariant violated");
        Self::InvariantViolation { details }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_follow_taxonomy() {
        assert_eq!(
            SimulationError::InsufficientLiquidity {
                requested: 10,
                filled: 4
            }
            .category(),
            ErrorCategory::InsufficientLiquidity
        );
        assert_eq!(
            SimulationError::invariant("solver overshoot").category(),
            ErrorCategory::InvariantViolation
        );
        assert_eq!(
            SimulationError::NonPositivePrice {
                field: "target_price",
                price: 0
            }
            .category(),
            ErrorCategory::Precondition
        );
        assert_eq!(
            SimulationError::math_overflow().category(),
            ErrorCategory::Precondition
        );
    }

    #[test]
    fn test_overflow_records_caller_location() {
        let err = SimulationError::math_overflow();
        let SimulationError::MathOverflow { location } = err else {
            panic!("expected overflow variant");
        };
        assert!(location.file().ends_with("errors.rs"));
        assert!(err_message_contains(
            &SimulationError::MathOverflow { location },
            "arithmetic overflow at"
        ));
    }

    fn err_message_contains(err: &SimulationError, needle: &str) -> bool {
        err.to_string().contains(needle)
    }

    #[test]
    fn test_insufficient_liquidity_message_reports_both_sizes() {
        let err = SimulationError::InsufficientLiquidity {
            requested: 500,
            filled: 120,
        };
        assert_eq!(
            err.to_string(),
            "insufficient liquidity: requested 500, only 120 fillable"
        );
    }
}
