//! Gradient boosting with squared loss
//!
//! Starts from the target mean; each stage fits a tree to the current
//! residuals and adds `learning_rate` times its prediction.

use super::tree::{self, RegressionTree, TreeConfig};
use ndarray::{ArrayView1, ArrayView2, Axis};

/// Returns the initial prediction and the fitted stages
pub(crate) fn fit_boosting(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    n_estimators: usize,
    config: &TreeConfig,
    learning_rate: f64,
) -> (f64, Vec<RegressionTree>) {
    let initial = y.mean().unwrap_or(0.0);
    let rows: Vec<usize> = (0..x.nrows()).collect();
    let mut residual = y.mapv(|v| v - initial);
    let mut stages = Vec::with_capacity(n_estimators);

    for _ in 0..n_estimators {
        let stage = tree::grow(x, residual.view(), &rows, config, None);
        for (r, row) in residual.iter_mut().zip(x.axis_iter(Axis(0))) {
            *r -= learning_rate * stage.predict_row(row);
        }
        stages.push(stage);
    }

    (initial, stages)
}
