//! Checked integer arithmetic for fixed-point financial calculations
//!
//! All engine values are scaled integers (see [`crate::precision`]). Products
//! of two scaled values can exceed 128 bits (the curve invariant alone is
//! `sqrt_k²`), so intermediates are widened to [`U192`] and narrowed back with
//! [`U192Ext::try_to_u128`].
//!
//! ## Design Principles
//!
//! - **No Silent Wrapping**: every operation is checked and returns
//!   [`SimulationError::MathOverflow`] carrying the call site
//! - **Explicit Narrowing**: casts between widths go through [`Cast`]
//! - **Floor by Default**: division truncates; rounding up is opt-in via
//!   [`SafeDivCeil`]

use crate::common::errors::{SimResult, SimulationError};

#[allow(clippy::assign_op_pattern, clippy::ptr_offset_with_cast)]
mod wide {
    uint::construct_uint! {
        /// 192-bit unsigned integer for invariant-scale intermediates
        pub struct U192(3);
    }
}

pub use wide::U192;

/// Checked arithmetic returning engine errors instead of `Option`
pub trait SafeMath: Sized {
    fn safe_add(self, rhs: Self) -> SimResult<Self>;
    fn safe_sub(self, rhs: Self) -> SimResult<Self>;
    fn safe_mul(self, rhs: Self) -> SimResult<Self>;
    fn safe_div(self, rhs: Self) -> SimResult<Self>;
}

macro_rules! impl_safe_math {
    ($($t:ty),*) => {$(
        impl SafeMath for $t {
            #[track_caller]
            #[inline]
            fn safe_add(self, rhs: Self) -> SimResult<Self> {
                match self.checked_add(rhs) {
                    Some(value) => Ok(value),
                    None => Err(SimulationError::math_overflow()),
                }
            }

            #[track_caller]
            #[inline]
            fn safe_sub(self, rhs: Self) -> SimResult<Self> {
                match self.checked_sub(rhs) {
                    Some(value) => Ok(value),
                    None => Err(SimulationError::math_overflow()),
                }
            }

            #[track_caller]
            #[inline]
            fn safe_mul(self, rhs: Self) -> SimResult<Self> {
                match self.checked_mul(rhs) {
                    Some(value) => Ok(value),
                    None => Err(SimulationError::math_overflow()),
                }
            }

            #[track_caller]
            #[inline]
            fn safe_div(self, rhs: Self) -> SimResult<Self> {
                match self.checked_div(rhs) {
                    Some(value) => Ok(value),
                    None => Err(SimulationError::math_overflow()),
                }
            }
        }
    )*};
}

impl_safe_math!(u64, i64, u128, i128, U192);

/// Division rounding toward positive infinity for unsigned values
pub trait SafeDivCeil: Sized {
    fn safe_div_ceil(self, rhs: Self) -> SimResult<Self>;
}

macro_rules! impl_safe_div_ceil {
    ($($t:ty),*) => {$(
        impl SafeDivCeil for $t {
            #[track_caller]
            fn safe_div_ceil(self, rhs: Self) -> SimResult<Self> {
                let (quotient, remainder) = match (self.checked_div(rhs), self.checked_rem(rhs)) {
                    (Some(quotient), Some(remainder)) => (quotient, remainder),
                    _ => return Err(SimulationError::math_overflow()),
                };
                if remainder == <$t>::from(0u8) {
                    Ok(quotient)
                } else {
                    quotient.safe_add(<$t>::from(1u8))
                }
            }
        }
    )*};
}

impl_safe_div_ceil!(u128, U192);

/// Checked conversion between integer widths
pub trait Cast: Sized {
    #[track_caller]
    fn cast<T: TryFrom<Self>>(self) -> SimResult<T> {
        match T::try_from(self) {
            Ok(value) => Ok(value),
            Err(_) => Err(SimulationError::math_overflow()),
        }
    }
}

impl Cast for u32 {}
impl Cast for u64 {}
impl Cast for i64 {}
impl Cast for u128 {}
impl Cast for i128 {}

/// Narrowing helpers for [`U192`]
pub trait U192Ext {
    fn try_to_u128(self) -> SimResult<u128>;
}

impl U192Ext for U192 {
    #[track_caller]
    fn try_to_u128(self) -> SimResult<u128> {
        if self.bits() > 128 {
            return Err(SimulationError::math_overflow());
        }
        Ok(self.low_u128())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::ErrorCategory;

    #[test]
    fn test_checked_ops_report_overflow() {
        assert!(u128::MAX.safe_add(1).is_err());
        assert!(0u128.safe_sub(1).is_err());
        assert!(7i128.safe_div(0).is_err());
        assert_eq!(6u128.safe_mul(7).unwrap(), 42);

        let err = u128::MAX.safe_mul(2).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Precondition);
        match err {
            SimulationError::MathOverflow { location } => {
                assert!(location.file().ends_with("fixed_point.rs"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_div_ceil_rounds_inexact_quotients_up() {
        assert_eq!(10u128.safe_div_ceil(5).unwrap(), 2);
        assert_eq!(11u128.safe_div_ceil(5).unwrap(), 3);
        assert_eq!(0u128.safe_div_ceil(5).unwrap(), 0);
        assert!(1u128.safe_div_ceil(0).is_err());
        assert_eq!(
            U192::from(1_001u64).safe_div_ceil(U192::from(1_000u64)).unwrap(),
            U192::from(2u64)
        );
    }

    #[test]
    fn test_u192_holds_invariant_scale_products() {
        let sqrt_k = U192::from(50_000_000_000_000_000_000u128);
        let invariant = sqrt_k.safe_mul(sqrt_k).unwrap();
        assert!(invariant.try_to_u128().is_err());
        assert_eq!(invariant.integer_sqrt(), sqrt_k);
        assert_eq!(
            invariant.safe_div(sqrt_k).unwrap().try_to_u128().unwrap(),
            50_000_000_000_000_000_000u128
        );
    }

    #[test]
    fn test_cast_rejects_out_of_range() {
        assert_eq!(5u128.cast::<i128>().unwrap(), 5i128);
        assert!(u128::MAX.cast::<i128>().is_err());
        assert!((-1i128).cast::<u128>().is_err());
        assert_eq!(300i64.cast::<u128>().unwrap(), 300u128);
    }
}
