//! Shared numeric primitives and the engine-wide error type

pub mod errors;
pub mod fixed_point;
