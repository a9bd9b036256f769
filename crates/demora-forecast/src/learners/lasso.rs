//! Lasso regression by cyclic coordinate descent
//!
//! Minimizes (1 / 2n) ||y - Z beta||^2 + alpha ||beta||_1 over standardized
//! features `Z`. Because every column of `Z` has unit population variance the
//! coordinate update is a plain soft threshold.

use super::linear::{LinearParams, Standardized};
use ndarray::{Array1, ArrayView1, ArrayView2};
use tracing::debug;

/// Fit lasso coefficients
pub(crate) fn fit_lasso(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    alpha: f64,
    max_iterations: usize,
    tolerance: f64,
) -> LinearParams {
    let design = Standardized::new(x, y);
    let n = x.nrows() as f64;
    let p = design.active.len();

    let mut beta = Array1::<f64>::zeros(p);
    let mut residual = design.y_centered.clone();

    for iteration in 0..max_iterations {
        let mut max_change = 0.0_f64;
        for j in 0..p {
            let column = design.z.column(j);
            let rho = column.dot(&residual) / n + beta[j];
            let updated = soft_threshold(rho, alpha);
            let delta = updated - beta[j];
            if delta != 0.0 {
                residual.scaled_add(-delta, &column);
                beta[j] = updated;
                max_change = max_change.max(delta.abs());
            }
        }
        if max_change < tolerance {
            debug!(iterations = iteration + 1, "lasso converged");
            return design.to_params(&beta);
        }
    }

    debug!(max_iterations, "lasso stopped at the iteration limit");
    design.to_params(&beta)
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_zero_penalty_matches_ols() {
        let x = array![[1.0, 0.5], [2.0, -1.0], [3.0, 2.0], [4.0, 0.0], [5.0, 1.0]];
        let y = array![1.0, 2.5, 2.0, 4.5, 4.8];
        let lasso = fit_lasso(x.view(), y.view(), 0.0, 10_000, 1e-12);
        let ols = super::super::linear::fit_ridge(x.view(), y.view(), 0.0).unwrap();
        assert_abs_diff_eq!(lasso.coefficients[0], ols.coefficients[0], epsilon = 1e-6);
        assert_abs_diff_eq!(lasso.coefficients[1], ols.coefficients[1], epsilon = 1e-6);
    }

    #[test]
    fn test_large_penalty_zeroes_everything() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        let params = fit_lasso(x.view(), y.view(), 100.0, 100, 1e-8);
        assert_eq!(params.coefficients[0], 0.0);
        assert_abs_diff_eq!(params.intercept, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_soft_threshold() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }
}
