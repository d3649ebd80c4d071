//! Drivemon Common - Shared types and utilities
//!
//! This crate provides the common error type and the numeric/unit
//! formatting helpers used across all Drivemon components.

pub mod error;
pub mod units;

pub use error::{Error, Result};
pub use units::{capacity_string, comma_grouped, u128_from_limbs, u128_to_f64};
