//! Cohort normalization of raw score components.

use crate::config::Normalization;
use std::cmp::Ordering;

/// Spread below which a component is treated as constant
pub const DEGENERATE_RANGE: f64 = 1e-12;

impl Normalization {
    /// Map raw values onto [0, 1] across the cohort
    ///
    /// Returns `None` when the values have no spread; callers substitute zeros
    /// and attach a `DegenerateComponent` warning.
    pub fn apply(&self, values: &[f64]) -> Option<Vec<f64>> {
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if values.len() < 2 || !(max - min).is_finite() || max - min < DEGENERATE_RANGE {
            return None;
        }
        let normalized = match self {
            Self::MinMax => values.iter().map(|v| (v - min) / (max - min)).collect(),
            Self::Rank => {
                let last = (values.len() - 1) as f64;
                average_ranks(values).into_iter().map(|r| r / last).collect()
            }
        };
        Some(normalized)
    }
}

/// Zero-based ranks in ascending order; ties share their average rank
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end - 1) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}
