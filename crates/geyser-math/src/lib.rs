//! # Geyser Math - Fixed-Point & Bonus Primitives
//!
//! Numerical foundation for the Geyser staking accounting core.
//!
//! This crate provides two layers:
//! - `fixed` - Q64.64 fixed-point arithmetic: binary/decimal logarithms,
//!   wide multiply-divide, and conversions to the 1e18 decimal scale that
//!   token amounts use
//! - `bonus` - the GYSR spend bonus multiplier and the time bonus envelope
//!   built on top of those primitives
//!
//! ## Representation
//!
//! | Quantity | Type | Scale |
//! |----------|------|-------|
//! | Token amounts, shares, multipliers | `u128` | 1e18 decimal fixed point |
//! | Logarithm arguments/results | `u128` / `i128` | Q64.64 binary fixed point |
//! | Usage ratio | `u128` | 1e18, clamped to `[0, 1e18]` |
//!
//! All computation is deterministic integer arithmetic; there is no
//! floating point anywhere on the accounting path.

pub mod bonus;
pub mod error;
pub mod fixed;

pub use bonus::{gysr_bonus, time_bonus, BonusParameters};
pub use error::{MathError, Result};
pub use fixed::{from_q64, log10, log2, mul_div, to_q64, LOG2_10, Q64_ONE, UNIT};
