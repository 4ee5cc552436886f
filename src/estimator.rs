//! Pluggable frequency-to-entropy estimation policies.
//!
//! An estimator never sees the symbols themselves - only the total
//! occurrence count of each distinct symbol. Feeding it the counts
//! `c_1..c_k` with grand total `N` is enough to evaluate any of the
//! supported entropy formulas:
//!
//! - `empirical`: maximum-likelihood plug-in,
//!   `H = -Σ (c_i/N) * log(c_i/N)`
//! - `miller-madow`: the plug-in estimate plus the `(K-1)/(2N)`
//!   small-sample bias correction
//! - `chao-shen`: coverage-adjusted Horvitz-Thompson estimator,
//!   `H = -Σ C*p_i * ln(C*p_i) / (1 - (1 - C*p_i)^N)` with sample
//!   coverage `C = 1 - f1/N` (`f1` = number of singleton counts)
//!
//! Entropy is computed in natural log internally and converted to the
//! configured base via a multiplicative constant resolved once at
//! construction.

use crate::error::{AggregateError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Logarithm base for entropy values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LogBase {
    /// Euler's number (entropy in nats)
    E,
    /// Base 2 (entropy in bits)
    Two,
    /// Base 10 (entropy in hartleys)
    Ten,
    /// Arbitrary positive real base, not equal to 1
    Custom(f64),
}

impl LogBase {
    /// Natural logarithm of the base.
    #[inline]
    fn ln(self) -> f64 {
        match self {
            LogBase::E => 1.0,
            LogBase::Two => std::f64::consts::LN_2,
            LogBase::Ten => std::f64::consts::LN_10,
            LogBase::Custom(b) => b.ln(),
        }
    }
}

impl Default for LogBase {
    fn default() -> Self {
        LogBase::E
    }
}

impl FromStr for LogBase {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "e" | "euler" => Ok(LogBase::E),
            "2" => Ok(LogBase::Two),
            "10" => Ok(LogBase::Ten),
            other => match other.parse::<f64>() {
                Ok(b) if b.is_finite() && b > 0.0 && b != 1.0 => Ok(LogBase::Custom(b)),
                _ => Err(AggregateError::ConfigError(format!(
                    "invalid logarithm base: {:?} (expected \"e\", \"2\", \"10\", \
                     or a positive real != 1)",
                    other
                ))),
            },
        }
    }
}

/// Entropy estimation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimatorPolicy {
    /// Maximum-likelihood plug-in estimator
    Empirical,
    /// Miller-Madow bias-corrected estimator
    MillerMadow,
    /// Chao-Shen coverage-adjusted estimator
    ChaoShen,
}

impl FromStr for EstimatorPolicy {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "empirical" => Ok(EstimatorPolicy::Empirical),
            "miller-madow" => Ok(EstimatorPolicy::MillerMadow),
            "chao-shen" => Ok(EstimatorPolicy::ChaoShen),
            other => Err(AggregateError::ConfigError(format!(
                "unknown estimator policy: {:?} (expected \"empirical\", \
                 \"miller-madow\", or \"chao-shen\")",
                other
            ))),
        }
    }
}

/// Accumulates a multiset of symbol occurrence counts and evaluates
/// entropy under the configured policy and logarithm base.
///
/// `entropy()` over zero accumulated counts is 0.0 by convention, never
/// an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntropyEstimator {
    policy: EstimatorPolicy,
    /// Multiplicative nats-to-target-base factor, fixed at construction
    scale: f64,
    counts: Vec<u64>,
    total: u64,
}

impl EntropyEstimator {
    /// Create an estimator from typed configuration.
    pub fn new(policy: EstimatorPolicy, base: LogBase) -> Self {
        Self {
            policy,
            scale: 1.0 / base.ln(),
            counts: Vec::new(),
            total: 0,
        }
    }

    /// Create an estimator from string configuration, e.g.
    /// `("empirical", "2")`. An unrecognized policy name or base fails
    /// with a configuration error - no silent default substitution.
    pub fn from_config(policy: &str, base: &str) -> Result<Self> {
        Ok(Self::new(policy.parse()?, base.parse()?))
    }

    /// Record that some symbol occurred `count` times in total.
    ///
    /// A count of zero carries no information and is ignored, which lets
    /// callers flush a possibly-empty final run unconditionally.
    pub fn accumulate(&mut self, count: u64) {
        if count == 0 {
            return;
        }
        self.counts.push(count);
        self.total += count;
    }

    /// Clear all accumulated counts, readying the instance for a new
    /// independent estimation.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.total = 0;
    }

    /// Grand total of accumulated occurrences.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct symbols accumulated so far.
    #[inline]
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Entropy of the accumulated count distribution, in the configured
    /// base.
    pub fn entropy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let nats = match self.policy {
            EstimatorPolicy::Empirical => self.mle(),
            EstimatorPolicy::MillerMadow => self.mle() + self.miller_madow_correction(),
            EstimatorPolicy::ChaoShen => self.chao_shen(),
        };
        nats * self.scale
    }

    /// Plug-in estimate in nats.
    fn mle(&self) -> f64 {
        let n = self.total as f64;
        let mut h = 0.0;
        for &count in &self.counts {
            let p = count as f64 / n;
            h -= p * p.ln();
        }
        h
    }

    /// (K - 1) / (2N)
    #[inline]
    fn miller_madow_correction(&self) -> f64 {
        (self.counts.len().saturating_sub(1)) as f64 / (2.0 * self.total as f64)
    }

    /// Chao-Shen estimate in nats.
    fn chao_shen(&self) -> f64 {
        let n = self.total as f64;
        let mut f1 = self.counts.iter().filter(|&&c| c == 1).count() as f64;
        if f1 == n {
            // avoid zero sample coverage when every observation is a singleton
            f1 = n - 1.0;
        }
        let coverage = 1.0 - f1 / n;

        let mut h = 0.0;
        for &count in &self.counts {
            let cp = coverage * count as f64 / n;
            if cp > 0.0 {
                h -= cp * cp.ln() / (1.0 - (1.0 - cp).powf(n));
            }
        }
        h
    }
}
