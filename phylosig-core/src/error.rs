//! Structured error types for signal statistics.

use thiserror::Error;

/// Unified error type for all phylosig operations.
///
/// Every variant is a contract violation reported before a result is
/// produced; none of them is retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    /// Trait vector length and matrix dimensions disagree, or a matrix is
    /// not square / ragged.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A matrix that must be inverted has no inverse.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// A denominator or determinant the statistic depends on is zero,
    /// negative, or undefined.
    #[error("degenerate input: {0}")]
    Degenerate(String),

    /// Permutation count below one.
    #[error("invalid repetition count {0}: at least one permutation is required")]
    InvalidRepetitions(usize),

    /// Other bad arguments (empty input, non-finite parameters).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience alias used throughout phylosig.
pub type Result<T> = std::result::Result<T, SignalError>;
