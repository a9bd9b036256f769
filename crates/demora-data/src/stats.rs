//! Small descriptive statistics shared across stages.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Mean and population standard deviation of a set of values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation (divisor `n`)
    pub std: f64,
}

impl Summary {
    /// Summarize a slice; `None` when empty
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mean = mean(values)?;
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        Some(Self {
            mean,
            std: variance.sqrt(),
        })
    }
}

/// Arithmetic mean; `None` when empty
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Mean and population standard deviation of the non-`NaN` entries of a column
pub fn column_summary(column: ArrayView1<'_, f64>) -> Option<Summary> {
    let present: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
    Summary::from_values(&present)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_summary() {
        let summary = Summary::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_relative_eq!(summary.mean, 5.0);
        assert_relative_eq!(summary.std, 2.0);
    }

    #[test]
    fn test_summary_empty() {
        assert!(Summary::from_values(&[]).is_none());
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn test_column_summary_skips_missing() {
        let column = array![1.0, f64::NAN, 3.0];
        let summary = column_summary(column.view()).unwrap();
        assert_relative_eq!(summary.mean, 2.0);
        assert_relative_eq!(summary.std, 1.0);
    }
}
