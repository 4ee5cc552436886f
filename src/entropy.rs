//! Streaming Shannon entropy over a stream already grouped by symbol.
//!
//! The engine counts run lengths as it streams through a sorted symbol
//! sequence and hands each completed run total to an
//! [`EntropyEstimator`](crate::EntropyEstimator). Counting by run length
//! trades a sortedness precondition for O(1) auxiliary state instead of a
//! frequency table keyed by symbol.
//!
//! Sortedness is enforced, not assumed: the engine remembers the sign of
//! the previous non-equal comparison, and a sign flip (a strict decrease
//! after a strict increase, or vice versa) is a fatal input error carrying
//! both symbols and both comparison results.

use crate::error::{AggregateError, Result};
use crate::estimator::{EntropyEstimator, EstimatorPolicy, LogBase};
use std::cmp::Ordering;
use std::fmt::Debug;

/// Comparison result as the sign convention used in ordering errors.
#[inline]
pub(crate) fn sign(ord: Ordering) -> i32 {
    match ord {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Streaming entropy engine over a sorted symbol stream.
///
/// Lifecycle: accumulate one or more batches, call [`finalize`] once to
/// obtain the entropy, then [`reset`] before reuse for a new group.
/// Accumulating after `finalize` without a `reset` is rejected with a
/// state error.
///
/// [`finalize`]: StreamingEntropy::finalize
/// [`reset`]: StreamingEntropy::reset
#[derive(Debug, Clone)]
pub struct StreamingEntropy<K> {
    estimator: EntropyEstimator,
    /// Last symbol seen, None before the first element
    prev: Option<K>,
    /// Length of the current run of equal symbols
    run: u64,
    /// Sign memory of the last non-equal comparison
    last_cmp: Ordering,
    finalized: bool,
}

impl<K: Ord + Debug> StreamingEntropy<K> {
    /// Create an engine with typed configuration.
    pub fn new(policy: EstimatorPolicy, base: LogBase) -> Self {
        Self {
            estimator: EntropyEstimator::new(policy, base),
            prev: None,
            run: 0,
            last_cmp: Ordering::Equal,
            finalized: false,
        }
    }

    /// Create an engine from string configuration, e.g. `("empirical", "e")`.
    pub fn from_config(policy: &str, base: &str) -> Result<Self> {
        Ok(Self::new(policy.parse()?, base.parse()?))
    }

    /// Stream one batch of symbols, appending to internal state.
    ///
    /// The concatenation of all batches must be sorted (non-decreasing or
    /// non-increasing - either direction is accepted, flips are not).
    pub fn accumulate<I>(&mut self, batch: I) -> Result<()>
    where
        I: IntoIterator<Item = K>,
    {
        if self.finalized {
            return Err(AggregateError::StateError(
                "accumulate after finalize; call reset first".to_string(),
            ));
        }

        for symbol in batch {
            if let Some(prev) = &self.prev {
                let cmp = symbol.cmp(prev);
                if (cmp == Ordering::Less && self.last_cmp == Ordering::Greater)
                    || (cmp == Ordering::Greater && self.last_cmp == Ordering::Less)
                {
                    return Err(AggregateError::OrderingViolation {
                        prev: format!("{:?}", prev),
                        current: format!("{:?}", symbol),
                        cmp: sign(cmp),
                        last_cmp: sign(self.last_cmp),
                    });
                }
                if cmp != Ordering::Equal {
                    // run complete: flush its total
                    self.estimator.accumulate(self.run);
                    self.run = 0;
                    self.last_cmp = cmp;
                }
            }
            self.prev = Some(symbol);
            self.run += 1;
        }
        Ok(())
    }

    /// Flush the final run and return the entropy of the streamed
    /// distribution. An empty stream yields 0.0.
    pub fn finalize(&mut self) -> Result<f64> {
        if self.finalized {
            return Err(AggregateError::StateError(
                "finalize called twice; call reset first".to_string(),
            ));
        }
        self.estimator.accumulate(self.run);
        self.run = 0;
        self.finalized = true;
        Ok(self.estimator.entropy())
    }

    /// Return the engine to its initial empty state. Required between
    /// logical groups sharing one instance.
    pub fn reset(&mut self) {
        self.estimator.reset();
        self.prev = None;
        self.run = 0;
        self.last_cmp = Ordering::Equal;
        self.finalized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_uniform_stream_bits() {
        let mut engine = StreamingEntropy::from_config("empirical", "2").unwrap();
        engine.accumulate(vec![1, 1, 2, 2, 3, 3, 4, 4]).unwrap();
        let h = engine.finalize().unwrap();
        assert!(approx_eq(h, 2.0, 1e-9));
    }

    #[test]
    fn test_batches_equal_single_pass() {
        let mut split = StreamingEntropy::from_config("empirical", "e").unwrap();
        split.accumulate(vec!["a", "a", "a"]).unwrap();
        // run continues across the batch boundary
        split.accumulate(vec!["a", "b", "b", "c"]).unwrap();

        let mut whole = StreamingEntropy::from_config("empirical", "e").unwrap();
        whole
            .accumulate(vec!["a", "a", "a", "a", "b", "b", "c"])
            .unwrap();

        assert!(approx_eq(
            split.finalize().unwrap(),
            whole.finalize().unwrap(),
            1e-12
        ));
    }

    #[test]
    fn test_descending_stream_accepted() {
        let mut engine = StreamingEntropy::from_config("empirical", "2").unwrap();
        engine.accumulate(vec![3, 3, 2, 1, 1]).unwrap();
        assert!(engine.finalize().unwrap() > 0.0);
    }

    #[test]
    fn test_sign_flip_rejected() {
        let mut engine = StreamingEntropy::from_config("empirical", "2").unwrap();
        let err = engine.accumulate(vec![1, 2, 3, 2]).unwrap_err();
        match err {
            AggregateError::OrderingViolation {
                prev,
                current,
                cmp,
                last_cmp,
            } => {
                assert_eq!(prev, "3");
                assert_eq!(current, "2");
                assert_eq!(cmp, -1);
                assert_eq!(last_cmp, 1);
            }
            other => panic!("expected ordering violation, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_stream_is_zero() {
        let mut engine = StreamingEntropy::<i32>::from_config("empirical", "e").unwrap();
        assert_eq!(engine.finalize().unwrap(), 0.0);
    }

    #[test]
    fn test_accumulate_after_finalize_rejected() {
        let mut engine = StreamingEntropy::from_config("empirical", "e").unwrap();
        engine.accumulate(vec![1, 1, 2]).unwrap();
        engine.finalize().unwrap();

        let err = engine.accumulate(vec![3]).unwrap_err();
        assert!(matches!(err, AggregateError::StateError(_)));

        // reset makes the instance reusable
        engine.reset();
        engine.accumulate(vec![5, 5]).unwrap();
        assert!(approx_eq(engine.finalize().unwrap(), 0.0, 1e-12));
    }

    #[test]
    fn test_finalize_twice_rejected() {
        let mut engine = StreamingEntropy::from_config("empirical", "e").unwrap();
        engine.accumulate(vec![1, 2]).unwrap();
        engine.finalize().unwrap();
        assert!(matches!(
            engine.finalize(),
            Err(AggregateError::StateError(_))
        ));
    }
}
