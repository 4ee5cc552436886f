//! Combiner-friendly three-stage aggregation protocol.
//!
//! A distributed execution splits one logical aggregation across shards:
//!
//! ```text
//! [shard batch] -> Initial -> partial ──┐
//! [shard batch] -> Initial -> partial ──┼─> Intermediate -> partial -> Final -> value
//! [shard batch] -> Initial -> partial ──┘        ▲
//!                                 (repeatable, any tree grouping)
//! ```
//!
//! The invariant: running `Initial` once over the whole dataset then
//! `Final` equals running `Initial` per shard, merging the partials with
//! `Intermediate` in any grouping or order, then `Final`. Entropy partials
//! are per-key occurrence counters (merge = per-key summation, order
//! independent); reservoir partials are scored resident snapshots (merge =
//! top-k by priority, order independent given the same keys).
//!
//! Partial states are plain serde-serializable values, opaque to the
//! orchestrator beyond being passed back verbatim.

use crate::error::{AggregateError, Result};
use crate::estimator::{EntropyEstimator, EstimatorPolicy, LogBase};
use crate::reservoir::{ScoredItem, WeightedReservoir};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// Three-stage aggregation: per-shard partial pass, repeatable partial
/// merge, final answer extraction.
///
/// `Initial` and `Intermediate` outputs have the same shape, so
/// `Intermediate` composes into reduction trees of any fan-in. All three
/// stages are idempotent given the same input; retry is an orchestration
/// concern.
pub trait Algebraic {
    /// Raw record consumed by the per-shard pass.
    type Input;
    /// Transportable intermediate state.
    type Partial;
    /// Externally visible result.
    type Output;

    /// Fold one shard's raw batch into a partial state.
    fn initial(&mut self, batch: Vec<Self::Input>) -> Result<Self::Partial>;

    /// Merge partial states (each possibly itself merged) into one.
    fn intermediate(&mut self, partials: Vec<Self::Partial>) -> Result<Self::Partial>;

    /// Convert one fully merged partial state into the final answer.
    fn final_value(&mut self, partial: Self::Partial) -> Result<Self::Output>;
}

/// Occurrence counter keyed by an opaque comparable symbol (or symbol
/// pair). Built incrementally, never decremented; merging sums per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolCounter<K: Ord> {
    counts: BTreeMap<K, u64>,
}

impl<K: Ord> SymbolCounter<K> {
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Record one occurrence of `key`.
    pub fn observe(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    /// Record `count` occurrences of `key`.
    pub fn add(&mut self, key: K, count: u64) {
        *self.counts.entry(key).or_insert(0) += count;
    }

    /// Per-key summation merge. Associative and commutative.
    pub fn merge(&mut self, other: Self) {
        for (key, count) in other.counts {
            self.add(key, count);
        }
    }

    /// Iterate (key, count) in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.counts.iter().map(|(k, &c)| (k, c))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl<K: Ord> Default for SymbolCounter<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Algebraic Shannon entropy over opaque symbols.
///
/// Unlike [`StreamingEntropy`](crate::StreamingEntropy), the per-shard
/// pass counts into a keyed table and therefore accepts unsorted batches,
/// trading O(distinct) memory for order independence - the price of a
/// mergeable partial state.
#[derive(Debug, Clone)]
pub struct EntropyAggregation<K> {
    policy: EstimatorPolicy,
    base: LogBase,
    _key: PhantomData<K>,
}

impl<K: Ord> EntropyAggregation<K> {
    pub fn new(policy: EstimatorPolicy, base: LogBase) -> Self {
        Self {
            policy,
            base,
            _key: PhantomData,
        }
    }

    /// String configuration, e.g. `("empirical", "2")`.
    pub fn from_config(policy: &str, base: &str) -> Result<Self> {
        Ok(Self::new(policy.parse()?, base.parse()?))
    }
}

impl<K: Ord> Algebraic for EntropyAggregation<K> {
    type Input = K;
    type Partial = SymbolCounter<K>;
    type Output = f64;

    fn initial(&mut self, batch: Vec<K>) -> Result<SymbolCounter<K>> {
        let mut counter = SymbolCounter::new();
        for key in batch {
            counter.observe(key);
        }
        Ok(counter)
    }

    fn intermediate(&mut self, partials: Vec<SymbolCounter<K>>) -> Result<SymbolCounter<K>> {
        let mut merged = SymbolCounter::new();
        for partial in partials {
            merged.merge(partial);
        }
        Ok(merged)
    }

    fn final_value(&mut self, partial: SymbolCounter<K>) -> Result<f64> {
        let mut estimator = EntropyEstimator::new(self.policy, self.base);
        for (_key, count) in partial.iter() {
            estimator.accumulate(count);
        }
        Ok(estimator.entropy())
    }
}

/// Algebraic conditional entropy H(Y|X) over (X, Y) pairs.
///
/// The partial state is a joint-pair counter; the marginal X counts are
/// recovered at finalization by summing runs of equal X over the
/// key-ordered joint table, so no second counter travels between shards.
#[derive(Debug, Clone)]
pub struct ConditionalEntropyAggregation<X, Y> {
    policy: EstimatorPolicy,
    base: LogBase,
    _pair: PhantomData<(X, Y)>,
}

impl<X: Ord, Y: Ord> ConditionalEntropyAggregation<X, Y> {
    pub fn new(policy: EstimatorPolicy, base: LogBase) -> Self {
        Self {
            policy,
            base,
            _pair: PhantomData,
        }
    }

    /// String configuration, e.g. `("empirical", "2")`.
    pub fn from_config(policy: &str, base: &str) -> Result<Self> {
        Ok(Self::new(policy.parse()?, base.parse()?))
    }
}

impl<X: Ord, Y: Ord> Algebraic for ConditionalEntropyAggregation<X, Y> {
    type Input = (X, Y);
    type Partial = SymbolCounter<(X, Y)>;
    type Output = f64;

    fn initial(&mut self, batch: Vec<(X, Y)>) -> Result<SymbolCounter<(X, Y)>> {
        let mut counter = SymbolCounter::new();
        for pair in batch {
            counter.observe(pair);
        }
        Ok(counter)
    }

    fn intermediate(
        &mut self,
        partials: Vec<SymbolCounter<(X, Y)>>,
    ) -> Result<SymbolCounter<(X, Y)>> {
        let mut merged = SymbolCounter::new();
        for partial in partials {
            merged.merge(partial);
        }
        Ok(merged)
    }

    fn final_value(&mut self, partial: SymbolCounter<(X, Y)>) -> Result<f64> {
        let mut joint = EntropyEstimator::new(self.policy, self.base);
        let mut marginal = EntropyEstimator::new(self.policy, self.base);

        // keys iterate in (X, then Y) order, so equal-X entries are contiguous
        let mut current_x: Option<&X> = None;
        let mut x_run = 0u64;
        for ((x, _y), count) in partial.iter() {
            joint.accumulate(count);
            match current_x {
                Some(cx) if cx.cmp(x) == Ordering::Equal => x_run += count,
                _ => {
                    marginal.accumulate(x_run);
                    current_x = Some(x);
                    x_run = count;
                }
            }
        }
        marginal.accumulate(x_run);

        Ok(joint.entropy() - marginal.entropy())
    }
}

/// A row of host-engine fields. One field carries the sampling weight.
pub type Row = Vec<Value>;

/// Algebraic weighted reservoir sampling over rows.
///
/// Configured with the reservoir capacity and the index of the weight
/// field. A missing or non-numeric weight field fails the group fast with
/// a descriptive error; full record shape validation belongs to the host
/// schema layer.
#[derive(Debug)]
pub struct RowReservoirAggregation {
    capacity: usize,
    weight_field: usize,
    rng: StdRng,
}

impl RowReservoirAggregation {
    /// Create an aggregation with an OS-seeded generator.
    pub fn new(capacity: usize, weight_field: usize) -> Result<Self> {
        Self::with_rng(capacity, weight_field, StdRng::from_os_rng())
    }

    /// Create an aggregation with a deterministic seed, for replayable
    /// tests and simulations.
    pub fn with_seed(capacity: usize, weight_field: usize, seed: u64) -> Result<Self> {
        Self::with_rng(capacity, weight_field, StdRng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, weight_field: usize, rng: StdRng) -> Result<Self> {
        if capacity == 0 {
            return Err(AggregateError::ConfigError(
                "reservoir capacity must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            weight_field,
            rng,
        })
    }

    fn extract_weight(&self, row: &Row) -> Result<f64> {
        let field = row.get(self.weight_field).ok_or_else(|| {
            AggregateError::InvalidRecord(format!(
                "row has {} fields, weight field index is {}",
                row.len(),
                self.weight_field
            ))
        })?;
        field.as_f64().ok_or_else(|| {
            AggregateError::InvalidRecord(format!(
                "weight field {} is not numeric: {}",
                self.weight_field, field
            ))
        })
    }
}

impl Algebraic for RowReservoirAggregation {
    type Input = Row;
    type Partial = Vec<ScoredItem<Row>>;
    type Output = Vec<Row>;

    fn initial(&mut self, batch: Vec<Row>) -> Result<Vec<ScoredItem<Row>>> {
        let shard_rng = StdRng::from_rng(&mut self.rng);
        let mut reservoir = WeightedReservoir::with_rng(self.capacity, shard_rng)?;
        for row in batch {
            let weight = self.extract_weight(&row)?;
            reservoir.insert(row, weight)?;
        }
        Ok(reservoir.into_scored())
    }

    fn intermediate(
        &mut self,
        partials: Vec<Vec<ScoredItem<Row>>>,
    ) -> Result<Vec<ScoredItem<Row>>> {
        let mut union: Vec<ScoredItem<Row>> = partials.into_iter().flatten().collect();
        // top-k of the union; priorities are immutable and context-free
        union.sort_unstable_by(|a, b| b.cmp(a));
        union.truncate(self.capacity);
        Ok(union)
    }

    fn final_value(&mut self, partial: Vec<ScoredItem<Row>>) -> Result<Vec<Row>> {
        Ok(partial.into_iter().map(|scored| scored.item).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_entropy_split_remerge_matches_unsplit() {
        let symbols: Vec<u32> = (0..200).map(|i| i % 7).collect();
        let mut agg = EntropyAggregation::from_config("empirical", "2").unwrap();

        let unsplit = agg.initial(symbols.clone()).unwrap();
        let h_unsplit = agg.final_value(unsplit).unwrap();

        // three shards, merged in a nested tree
        let p1 = agg.initial(symbols[..50].to_vec()).unwrap();
        let p2 = agg.initial(symbols[50..120].to_vec()).unwrap();
        let p3 = agg.initial(symbols[120..].to_vec()).unwrap();

        let left = agg.intermediate(vec![p1.clone(), p2.clone()]).unwrap();
        let nested = agg.intermediate(vec![left, p3.clone()]).unwrap();
        let h_nested = agg.final_value(nested).unwrap();

        let flat = agg.intermediate(vec![p3, p2, p1]).unwrap();
        let h_flat = agg.final_value(flat).unwrap();

        assert!(approx_eq(h_unsplit, h_nested, 1e-12));
        assert!(approx_eq(h_unsplit, h_flat, 1e-12));
    }

    #[test]
    fn test_entropy_aggregation_matches_streaming_engine() {
        use crate::entropy::StreamingEntropy;

        let mut sorted: Vec<u32> = (0..100).map(|i| i % 5).collect();
        sorted.sort_unstable();

        let mut engine = StreamingEntropy::from_config("empirical", "e").unwrap();
        engine.accumulate(sorted.clone()).unwrap();
        let h_stream = engine.finalize().unwrap();

        // the algebraic path accepts the same data unsorted
        let unsorted: Vec<u32> = (0..100).map(|i| i % 5).collect();
        let mut agg = EntropyAggregation::from_config("empirical", "e").unwrap();
        let partial = agg.initial(unsorted).unwrap();
        let h_agg = agg.final_value(partial).unwrap();

        assert!(approx_eq(h_stream, h_agg, 1e-12));
    }

    #[test]
    fn test_conditional_aggregation_matches_streaming_engine() {
        use crate::conditional::ConditionalEntropyEngine;

        let pairs = vec![(1, "a"), (1, "a"), (1, "b"), (2, "a")];

        let mut engine = ConditionalEntropyEngine::from_config("empirical", "2").unwrap();
        engine.accumulate(pairs.clone()).unwrap();
        let h_stream = engine.finalize().unwrap();

        // shards are unsorted and split mid-run
        let mut agg = ConditionalEntropyAggregation::from_config("empirical", "2").unwrap();
        let p1 = agg.initial(vec![(2, "a"), (1, "a")]).unwrap();
        let p2 = agg.initial(vec![(1, "b"), (1, "a")]).unwrap();
        let merged = agg.intermediate(vec![p1, p2]).unwrap();
        let h_agg = agg.final_value(merged).unwrap();

        assert!(approx_eq(h_stream, h_agg, 1e-12));
    }

    #[test]
    fn test_empty_partials_merge_to_zero_entropy() {
        let mut agg = EntropyAggregation::<u32>::from_config("empirical", "2").unwrap();
        let merged = agg.intermediate(Vec::new()).unwrap();
        assert!(merged.is_empty());
        assert_eq!(agg.final_value(merged).unwrap(), 0.0);
    }

    #[test]
    fn test_symbol_counter_merge_sums_per_key() {
        let mut a = SymbolCounter::new();
        a.add("x", 2);
        a.add("y", 1);
        let mut b = SymbolCounter::new();
        b.add("x", 3);
        b.add("z", 4);

        a.merge(b);
        let merged: Vec<(&&str, u64)> = a.iter().collect();
        assert_eq!(merged, vec![(&"x", 5), (&"y", 1), (&"z", 4)]);
    }

    #[test]
    fn test_reservoir_aggregation_full_pipeline() {
        let rows: Vec<Row> = (0..100).map(|i| vec![json!(i), json!(i + 1)]).collect();

        let mut agg = RowReservoirAggregation::with_seed(10, 1, 42).unwrap();
        let p1 = agg.initial(rows[..50].to_vec()).unwrap();
        let p2 = agg.initial(rows[50..].to_vec()).unwrap();
        let merged = agg.intermediate(vec![p1, p2]).unwrap();
        let sample = agg.final_value(merged).unwrap();

        assert_eq!(sample.len(), 10);
        let found: HashSet<i64> = sample.iter().map(|row| row[0].as_i64().unwrap()).collect();
        assert_eq!(found.len(), 10, "sample contains duplicates");
        for &i in &found {
            assert!((0..100i64).contains(&i));
        }
    }

    #[test]
    fn test_reservoir_intermediate_caps_at_capacity() {
        let rows: Vec<Row> = (0..30).map(|i| vec![json!(i), json!(1.0)]).collect();

        let mut agg = RowReservoirAggregation::with_seed(5, 1, 7).unwrap();
        let partials: Vec<_> = rows
            .chunks(10)
            .map(|chunk| agg.initial(chunk.to_vec()).unwrap())
            .collect();
        let merged = agg.intermediate(partials).unwrap();
        assert_eq!(merged.len(), 5);
    }

    #[test]
    fn test_reservoir_missing_weight_field() {
        let mut agg = RowReservoirAggregation::with_seed(2, 3, 0).unwrap();
        let err = agg.initial(vec![vec![json!("a"), json!(1.0)]]).unwrap_err();
        assert!(matches!(err, AggregateError::InvalidRecord(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_reservoir_non_numeric_weight_field() {
        let mut agg = RowReservoirAggregation::with_seed(2, 1, 0).unwrap();
        let err = agg
            .initial(vec![vec![json!("a"), json!("heavy")]])
            .unwrap_err();
        assert!(matches!(err, AggregateError::InvalidRecord(_)));
    }

    #[test]
    fn test_reservoir_zero_weight_rejected() {
        let mut agg = RowReservoirAggregation::with_seed(2, 1, 0).unwrap();
        let err = agg.initial(vec![vec![json!("a"), json!(0.0)]]).unwrap_err();
        assert_eq!(err, AggregateError::InvalidWeight(0.0));
    }

    #[test]
    fn test_partials_survive_serialization() {
        // partial states are transportable: a serialize/deserialize hop
        // must not change the final answer
        let mut agg = EntropyAggregation::<String>::from_config("empirical", "2").unwrap();
        let partial = agg
            .initial(vec!["a".into(), "a".into(), "b".into()])
            .unwrap();
        let wire = serde_json::to_string(&partial).unwrap();
        let back: SymbolCounter<String> = serde_json::from_str(&wire).unwrap();
        assert_eq!(
            agg.final_value(back).unwrap(),
            agg.final_value(partial).unwrap()
        );
    }
}
