//! Error types for fixed-point and bonus math

use thiserror::Error;

/// Result type alias for math operations
pub type Result<T> = std::result::Result<T, MathError>;

/// Errors that can occur in fixed-point math operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    /// Logarithm of zero is undefined; callers must guard this case
    #[error("logarithm domain error: argument must be strictly positive")]
    LogDomain,

    /// Division by zero in a multiply-divide
    #[error("division by zero")]
    DivideByZero,

    /// Quotient does not fit in 128 bits
    #[error("multiply-divide overflow: intermediate quotient exceeds 128 bits")]
    Overflow,

    /// Bonus envelope where the minimum exceeds the maximum
    #[error("invalid bonus envelope: min multiplier {min} exceeds max {max}")]
    InvalidBonusEnvelope { min: u128, max: u128 },
}
