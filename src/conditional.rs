//! Conditional entropy H(Y|X) over a jointly sorted (X, Y) pair stream.
//!
//! The engine drives two estimators at once - joint H(X,Y) over runs of
//! equal (X, Y) pairs and marginal H(X) over runs of equal X - and applies
//! the chain rule on finalization:
//!
//! ```text
//! H(Y|X) = H(X,Y) - H(X)
//! ```
//!
//! The identity is exact given correct counts, so no separate
//! combinatorial formula for H(Y|X) is needed. As with
//! [`StreamingEntropy`](crate::StreamingEntropy), run-length counting
//! over the sorted stream keeps auxiliary state at O(1) instead of
//! O(distinct pairs), at the price of a strictly enforced sortedness
//! precondition.

use crate::entropy::sign;
use crate::error::{AggregateError, Result};
use crate::estimator::{EntropyEstimator, EstimatorPolicy, LogBase};
use std::cmp::Ordering;
use std::fmt::Debug;

/// Lifecycle state of the engine.
#[derive(Debug, Clone)]
enum EngineState<X, Y> {
    /// No element seen yet
    Empty,
    /// Mid-stream, holding the last pair and the sign memory of the last
    /// non-equal comparison
    Streaming { prev: (X, Y), last_cmp: Ordering },
    /// finalize() has run; only reset() is valid
    Finalized,
}

/// Streaming conditional entropy engine.
///
/// Input pairs must arrive sorted under the full (X, then Y) ordering,
/// in either direction. Lifecycle mirrors [`StreamingEntropy`]: one or
/// more `accumulate` calls, one `finalize`, then `reset` before reuse.
///
/// [`StreamingEntropy`]: crate::StreamingEntropy
#[derive(Debug, Clone)]
pub struct ConditionalEntropyEngine<X, Y> {
    state: EngineState<X, Y>,
    /// Occurrences of the current (X, Y) run
    joint_run: u64,
    /// Occurrences of the current X run
    x_run: u64,
    /// Estimator for H(X, Y)
    joint: EntropyEstimator,
    /// Estimator for H(X)
    marginal: EntropyEstimator,
}

impl<X, Y> ConditionalEntropyEngine<X, Y>
where
    X: Ord + Debug,
    Y: Ord + Debug,
{
    /// Create an engine with typed configuration. Both estimators share
    /// the policy and base.
    pub fn new(policy: EstimatorPolicy, base: LogBase) -> Self {
        Self {
            state: EngineState::Empty,
            joint_run: 0,
            x_run: 0,
            joint: EntropyEstimator::new(policy, base),
            marginal: EntropyEstimator::new(policy, base),
        }
    }

    /// Create an engine from string configuration, e.g. `("empirical", "2")`.
    pub fn from_config(policy: &str, base: &str) -> Result<Self> {
        Ok(Self::new(policy.parse()?, base.parse()?))
    }

    /// Stream one batch of (X, Y) pairs, appending to internal state.
    pub fn accumulate<I>(&mut self, batch: I) -> Result<()>
    where
        I: IntoIterator<Item = (X, Y)>,
    {
        for pair in batch {
            self.push(pair)?;
        }
        Ok(())
    }

    /// Advance the state machine by one pair.
    fn push(&mut self, pair: (X, Y)) -> Result<()> {
        match std::mem::replace(&mut self.state, EngineState::Empty) {
            EngineState::Finalized => {
                self.state = EngineState::Finalized;
                Err(AggregateError::StateError(
                    "accumulate after finalize; call reset first".to_string(),
                ))
            }
            EngineState::Empty => {
                self.joint_run = 1;
                self.x_run = 1;
                self.state = EngineState::Streaming {
                    prev: pair,
                    last_cmp: Ordering::Equal,
                };
                Ok(())
            }
            EngineState::Streaming { prev, last_cmp } => {
                let cmp = pair.cmp(&prev);
                if (cmp == Ordering::Less && last_cmp == Ordering::Greater)
                    || (cmp == Ordering::Greater && last_cmp == Ordering::Less)
                {
                    let err = AggregateError::OrderingViolation {
                        prev: format!("{:?}", prev),
                        current: format!("{:?}", pair),
                        cmp: sign(cmp),
                        last_cmp: sign(last_cmp),
                    };
                    self.state = EngineState::Streaming { prev, last_cmp };
                    return Err(err);
                }

                let mut last_cmp = last_cmp;
                if cmp != Ordering::Equal {
                    // new joint key: flush the completed (X, Y) run
                    self.joint.accumulate(self.joint_run);
                    self.joint_run = 0;
                    last_cmp = cmp;
                    if pair.0.cmp(&prev.0) != Ordering::Equal {
                        // X changed as well: flush the completed X run
                        self.marginal.accumulate(self.x_run);
                        self.x_run = 0;
                    }
                }

                self.joint_run += 1;
                self.x_run += 1;
                self.state = EngineState::Streaming {
                    prev: pair,
                    last_cmp,
                };
                Ok(())
            }
        }
    }

    /// Flush the final runs and return H(Y|X) via the chain rule.
    /// An empty stream yields 0.0.
    pub fn finalize(&mut self) -> Result<f64> {
        if matches!(self.state, EngineState::Finalized) {
            return Err(AggregateError::StateError(
                "finalize called twice; call reset first".to_string(),
            ));
        }
        // the last runs never see a "different key" transition
        self.joint.accumulate(self.joint_run);
        self.marginal.accumulate(self.x_run);
        self.joint_run = 0;
        self.x_run = 0;
        self.state = EngineState::Finalized;
        Ok(self.joint.entropy() - self.marginal.entropy())
    }

    /// Return the engine to its initial empty state. Required between
    /// logical groups sharing one instance.
    pub fn reset(&mut self) {
        self.state = EngineState::Empty;
        self.joint_run = 0;
        self.x_run = 0;
        self.joint.reset();
        self.marginal.reset();
    }
}
