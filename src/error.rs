//! Error types for the aggregation core.

use thiserror::Error;

/// Main error type for aggregation operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    /// Invalid construction-time configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Sorted-stream contract broken: the comparison sign flipped
    #[error(
        "Out of order input: previous {prev}, current {current}, \
         comparison: {cmp}, previous comparison: {last_cmp}"
    )]
    OrderingViolation {
        prev: String,
        current: String,
        cmp: i32,
        last_cmp: i32,
    },

    /// Sampling weight is not finite and strictly positive
    #[error("Invalid weight: {0} (must be finite and > 0)")]
    InvalidWeight(f64),

    /// Record is missing a field or carries a non-numeric weight field
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Reservoirs of different capacities cannot be merged
    #[error("Capacity mismatch: expected {expected}, got {got}")]
    CapacityMismatch { expected: usize, got: usize },

    /// Operation not valid in the engine's current lifecycle state
    #[error("State error: {0}")]
    StateError(String),
}

/// Result type alias for aggregation operations.
pub type Result<T> = std::result::Result<T, AggregateError>;

impl AggregateError {
    /// Check if this error is a violation of the per-group input contract,
    /// as opposed to a construction-time configuration mistake.
    ///
    /// An orchestrator may skip the offending group on an input error;
    /// configuration errors are fatal and never retried.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AggregateError::OrderingViolation { .. }
                | AggregateError::InvalidWeight(_)
                | AggregateError::InvalidRecord(_)
        )
    }
}
