//! Weighted reservoir sampling with mergeable partial reservoirs.
//!
//! Implements the A-Res family of weighted sampling without replacement:
//! every accepted item draws a priority key `u^(1/weight)` with `u`
//! uniform in (0, 1], and the reservoir keeps the k items with the
//! largest keys. In expectation, higher-weight items are more likely to
//! land among the final top-k priorities; with equal weights the scheme
//! degenerates to classical uniform k-of-n sampling with no separate
//! code path.
//!
//! Priority keys are immutable and context-free once drawn, so merging
//! two equal-capacity reservoirs - taking the top-k keys across the union
//! of residents - preserves the sampling distribution regardless of how
//! the input was partitioned. One formula is used everywhere: mixing key
//! formulas across merged reservoirs would break the guarantee.
//!
//! Each reservoir owns its random generator. Seed it explicitly for
//! deterministic replay under test; no global generator is consulted.

use crate::error::{AggregateError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A sampled item tagged with the priority key drawn when it was
/// considered. Ordering is by priority alone - never by weight or
/// arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem<T> {
    pub priority: f64,
    pub item: T,
}

impl<T> PartialEq for ScoredItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority.total_cmp(&other.priority) == Ordering::Equal
    }
}

impl<T> Eq for ScoredItem<T> {}

impl<T> PartialOrd for ScoredItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ScoredItem<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

/// Fixed-capacity weighted reservoir.
///
/// Holds at most `capacity` items; once full, an insertion either evicts
/// the minimum-priority resident or discards the candidate, decided
/// purely by priority comparison.
#[derive(Debug)]
pub struct WeightedReservoir<T, R: Rng = StdRng> {
    capacity: usize,
    /// Min-heap over priorities, so the eviction candidate is at the top
    heap: BinaryHeap<Reverse<ScoredItem<T>>>,
    rng: R,
}

impl<T> WeightedReservoir<T, StdRng> {
    /// Create an empty reservoir with an OS-seeded generator.
    ///
    /// Capacity zero is a configuration error.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_rng(capacity, StdRng::from_os_rng())
    }

    /// Create an empty reservoir with a deterministic seed.
    pub fn with_seed(capacity: usize, seed: u64) -> Result<Self> {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }
}

impl<T, R: Rng> WeightedReservoir<T, R> {
    /// Create an empty reservoir owning the given generator.
    pub fn with_rng(capacity: usize, rng: R) -> Result<Self> {
        if capacity == 0 {
            return Err(AggregateError::ConfigError(
                "reservoir capacity must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity + 1),
            rng,
        })
    }

    /// Consider one weighted item for membership.
    ///
    /// The weight must be finite and strictly positive; zero and negative
    /// weights are rejected rather than silently down-weighted to
    /// impossible-to-select.
    pub fn insert(&mut self, item: T, weight: f64) -> Result<()> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(AggregateError::InvalidWeight(weight));
        }
        let priority = self.draw_priority(weight);
        self.insert_scored(ScoredItem { priority, item });
        Ok(())
    }

    /// u^(1/weight) with u uniform in (0, 1].
    fn draw_priority(&mut self, weight: f64) -> f64 {
        let u = 1.0 - self.rng.random::<f64>();
        u.powf(1.0 / weight)
    }

    /// Admit a pre-scored item, evicting the minimum-priority resident
    /// when at capacity and the candidate ranks higher.
    pub(crate) fn insert_scored(&mut self, candidate: ScoredItem<T>) {
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(candidate));
        } else if let Some(min) = self.heap.peek() {
            if candidate > min.0 {
                self.heap.pop();
                self.heap.push(Reverse(candidate));
            }
        }
    }

    /// Merge two reservoirs of equal capacity, consuming both and keeping
    /// the top-k priorities across the union of residents.
    ///
    /// The operation is associative and commutative up to tie-breaking on
    /// equal priorities.
    pub fn merge(mut self, other: Self) -> Result<Self> {
        if self.capacity != other.capacity {
            return Err(AggregateError::CapacityMismatch {
                expected: self.capacity,
                got: other.capacity,
            });
        }
        for Reverse(scored) in other.heap {
            self.insert_scored(scored);
        }
        Ok(self)
    }

    /// Declared capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of current residents.
    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when no items have been admitted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Borrow the current residents. Unordered set semantics: no output
    /// ordering is implied. This is a snapshot, not a terminal operation -
    /// insertion may continue afterwards.
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.heap.iter().map(|Reverse(scored)| &scored.item)
    }

    /// Consume the reservoir and return the sampled items.
    pub fn into_items(self) -> Vec<T> {
        self.heap
            .into_iter()
            .map(|Reverse(scored)| scored.item)
            .collect()
    }

    /// Consume the reservoir and return residents with their priority
    /// keys, as a transportable partial state.
    pub fn into_scored(self) -> Vec<ScoredItem<T>> {
        self.heap.into_iter().map(|Reverse(scored)| scored).collect()
    }

    /// Discard all residents, readying the reservoir for a new group.
    /// The generator state is kept.
    pub fn reset(&mut self) {
        self.heap.clear();
    }
}
