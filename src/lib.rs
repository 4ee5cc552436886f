//! # Shardfold
//!
//! Statistical aggregation primitives that stay correct under a
//! map/combine/reduce execution model: the same logical aggregation may
//! run as one continuous pass over all data, or as a partial pass per
//! shard whose intermediate states are merged, recursively, into one
//! final result.
//!
//! ## Theory
//!
//! Two primitives carry the weight:
//!
//! - **Streaming entropy.** Over a sorted key stream, run-length counting
//!   recovers the per-symbol frequencies in O(1) auxiliary state, and the
//!   chain rule turns two entropy estimates into a conditional entropy:
//!
//!   ```text
//!   H(Y|X) = H(X,Y) - H(X)
//!   ```
//!
//! - **Weighted reservoir sampling.** Every item draws an immutable
//!   priority key `u^(1/weight)`, `u` uniform in (0, 1]; the sample is
//!   the top-k keys. Because keys are context-free, merging partial
//!   reservoirs by top-k of the union preserves the sampling
//!   distribution regardless of how the input was partitioned.
//!
//! The [`Algebraic`] trait packages both as Initial / Intermediate /
//! Final stages whose merge is associative and commutative with respect
//! to the final answer.
//!
//! ## Example
//!
//! ```rust
//! use shardfold::{ConditionalEntropyEngine, WeightedReservoir};
//!
//! // H(Y|X) over a jointly sorted pair stream
//! let mut engine = ConditionalEntropyEngine::from_config("empirical", "2").unwrap();
//! engine
//!     .accumulate(vec![(1, "a"), (1, "a"), (1, "b"), (2, "a")])
//!     .unwrap();
//! let h = engine.finalize().unwrap();
//! assert!(h > 0.0);
//!
//! // weighted k-of-n sample without replacement
//! let mut reservoir = WeightedReservoir::with_seed(2, 42).unwrap();
//! for (item, weight) in [("a", 100.0), ("b", 1.0), ("c", 5.0)] {
//!     reservoir.insert(item, weight).unwrap();
//! }
//! assert_eq!(reservoir.len(), 2);
//! ```

pub mod aggregate;
pub mod conditional;
pub mod entropy;
pub mod error;
pub mod estimator;
pub mod reservoir;

// Re-exports
pub use aggregate::{
    Algebraic, ConditionalEntropyAggregation, EntropyAggregation, Row, RowReservoirAggregation,
    SymbolCounter,
};
pub use conditional::ConditionalEntropyEngine;
pub use entropy::StreamingEntropy;
pub use error::{AggregateError, Result};
pub use estimator::{EntropyEstimator, EstimatorPolicy, LogBase};
pub use reservoir::{ScoredItem, WeightedReservoir};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
