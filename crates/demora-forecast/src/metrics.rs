//! Regression error metrics.

use ndarray::ArrayView1;

/// Mean absolute error (`NaN` when empty)
pub fn mae(actual: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    let n = actual.len() as f64;
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n
}

/// Root mean squared error (`NaN` when empty)
pub fn rmse(actual: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    let n = actual.len() as f64;
    (actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n)
        .sqrt()
}
