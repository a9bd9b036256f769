//! Partition agreement metrics
//!
//! All metrics are computed from the pair-counting view of the contingency
//! table between two labellings of the same items.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Agreement metric between two partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementMetric {
    /// Adjusted Rand index (chance-corrected, 1 = identical, ~0 = random)
    #[default]
    AdjustedRand,
    /// Rand index (fraction of concordant pairs)
    Rand,
    /// Fowlkes-Mallows index (geometric mean of pair precision and recall)
    FowlkesMallows,
}

impl AgreementMetric {
    /// Agreement between two labellings of the same items
    ///
    /// Labellings of different lengths are compared on their common prefix.
    pub fn score(&self, a: &[usize], b: &[usize]) -> f64 {
        let counts = PairCounts::new(a, b);
        match self {
            Self::AdjustedRand => counts.adjusted_rand(),
            Self::Rand => counts.rand(),
            Self::FowlkesMallows => counts.fowlkes_mallows(),
        }
    }
}

/// Pair counts derived from a contingency table
struct PairCounts {
    /// Pairs together in both labellings
    together_both: f64,
    /// Pairs together in the first labelling
    together_a: f64,
    /// Pairs together in the second labelling
    together_b: f64,
    /// All pairs
    total: f64,
}

fn pairs(n: usize) -> f64 {
    let n = n as f64;
    n * (n - 1.0) / 2.0
}

impl PairCounts {
    fn new(a: &[usize], b: &[usize]) -> Self {
        let n = a.len().min(b.len());
        let mut cells: HashMap<(usize, usize), usize> = HashMap::new();
        let mut rows: HashMap<usize, usize> = HashMap::new();
        let mut cols: HashMap<usize, usize> = HashMap::new();
        for (&x, &y) in a.iter().zip(b).take(n) {
            *cells.entry((x, y)).or_default() += 1;
            *rows.entry(x).or_default() += 1;
            *cols.entry(y).or_default() += 1;
        }
        Self {
            together_both: cells.values().map(|&c| pairs(c)).sum(),
            together_a: rows.values().map(|&c| pairs(c)).sum(),
            together_b: cols.values().map(|&c| pairs(c)).sum(),
            total: pairs(n),
        }
    }

    fn adjusted_rand(&self) -> f64 {
        if self.total == 0.0 {
            return 1.0;
        }
        let expected = self.together_a * self.together_b / self.total;
        let maximum = (self.together_a + self.together_b) / 2.0;
        if (maximum - expected).abs() < f64::EPSILON {
            // Both labellings are all-singletons or a single cluster
            return 1.0;
        }
        (self.together_both - expected) / (maximum - expected)
    }

    fn rand(&self) -> f64 {
        if self.total == 0.0 {
            return 1.0;
        }
        let apart_both =
            self.total - self.together_a - self.together_b + self.together_both;
        (self.together_both + apart_both) / self.total
    }

    fn fowlkes_mallows(&self) -> f64 {
        let denominator = (self.together_a * self.together_b).sqrt();
        if denominator == 0.0 {
            0.0
        } else {
            self.together_both / denominator
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    #[case(AgreementMetric::AdjustedRand)]
    #[case(AgreementMetric::Rand)]
    #[case(AgreementMetric::FowlkesMallows)]
    fn test_identical_up_to_relabelling(#[case] metric: AgreementMetric) {
        let a = [0, 0, 1, 1, 2, 2];
        let b = [2, 2, 0, 0, 1, 1];
        assert_abs_diff_eq!(metric.score(&a, &b), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_known_values() {
        // Expected index 1/3, maximum 3/2
        let a = [0, 0, 1, 1];
        let b = [0, 0, 1, 2];
        assert_abs_diff_eq!(
            AgreementMetric::AdjustedRand.score(&a, &b),
            4.0 / 7.0,
            epsilon = 1e-12
        );
        // 5 of 6 pairs agree
        assert_abs_diff_eq!(AgreementMetric::Rand.score(&a, &b), 5.0 / 6.0, epsilon = 1e-12);
        // 1 / sqrt(2 * 1)
        assert_abs_diff_eq!(
            AgreementMetric::FowlkesMallows.score(&a, &b),
            1.0 / 2.0_f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_disagreement_is_low() {
        let a = [0, 0, 0, 1, 1, 1];
        let b = [0, 1, 2, 0, 1, 2];
        assert!(AgreementMetric::AdjustedRand.score(&a, &b) < 1e-12);
    }
}
