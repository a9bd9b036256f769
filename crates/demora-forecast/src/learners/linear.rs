//! Ordinary least squares and ridge regression
//!
//! Features are centered and scaled to unit population variance before the
//! penalty is applied, so `alpha` means the same thing whatever the units of
//! the inputs. The intercept is never penalized. Coefficients are mapped back
//! to the original units after solving.
//!
//! Solves (Z^T Z + alpha I) beta = Z^T (y - mean(y)) by Cholesky; OLS is the
//! `alpha = 0` case. Constant columns carry no information and get a zero
//! coefficient.

use crate::error::ModelFitError;
use crate::linalg::cholesky_solve;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Columns whose population std falls below this are treated as constant
const CONSTANT_COLUMN: f64 = 1e-12;

/// Intercept and per-feature coefficients in original units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    /// Intercept
    pub intercept: f64,
    /// One coefficient per feature, in feature order
    pub coefficients: Vec<f64>,
}

impl LinearParams {
    /// Prediction for one feature row
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.intercept
            + row
                .iter()
                .zip(&self.coefficients)
                .map(|(x, beta)| x * beta)
                .sum::<f64>()
    }
}

/// Standardized design shared by ridge and lasso
pub(crate) struct Standardized {
    /// Standardized non-constant columns
    pub(crate) z: Array2<f64>,
    /// Original index of each column of `z`
    pub(crate) active: Vec<usize>,
    pub(crate) y_centered: Array1<f64>,
    means: Array1<f64>,
    scales: Array1<f64>,
    y_mean: f64,
    n_features: usize,
}

impl Standardized {
    pub(crate) fn new(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Self {
        let n = x.nrows() as f64;
        let means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let scales: Array1<f64> = x
            .axis_iter(Axis(1))
            .zip(&means)
            .map(|(column, mean)| {
                (column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
            })
            .collect();
        let active: Vec<usize> = (0..x.ncols())
            .filter(|&j| scales[j] > CONSTANT_COLUMN)
            .collect();

        let mut z = Array2::<f64>::zeros((x.nrows(), active.len()));
        for (k, &j) in active.iter().enumerate() {
            let column = x.column(j).mapv(|v| (v - means[j]) / scales[j]);
            z.column_mut(k).assign(&column);
        }

        let y_mean = y.mean().unwrap_or(0.0);
        Self {
            z,
            active,
            y_centered: y.mapv(|v| v - y_mean),
            means,
            scales,
            y_mean,
            n_features: x.ncols(),
        }
    }

    /// Map standardized coefficients (one per active column) back to original units
    pub(crate) fn to_params(&self, beta: &Array1<f64>) -> LinearParams {
        let mut coefficients = vec![0.0; self.n_features];
        let mut intercept = self.y_mean;
        for (k, &j) in self.active.iter().enumerate() {
            let coefficient = beta[k] / self.scales[j];
            coefficients[j] = coefficient;
            intercept -= coefficient * self.means[j];
        }
        LinearParams {
            intercept,
            coefficients,
        }
    }
}

/// Ridge regression; `alpha = 0` gives ordinary least squares
pub(crate) fn fit_ridge(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    alpha: f64,
) -> Result<LinearParams, ModelFitError> {
    let design = Standardized::new(x, y);
    if design.active.is_empty() {
        return Ok(design.to_params(&Array1::zeros(0)));
    }

    let mut gram = design.z.t().dot(&design.z);
    for i in 0..gram.nrows() {
        gram[[i, i]] += alpha;
    }
    let rhs = design.z.t().dot(&design.y_centered);
    let beta = cholesky_solve(&gram, &rhs)?;
    Ok(design.to_params(&beta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_ols_recovers_exact_line() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 3.0]];
        let y = x.column(0).mapv(|v| 2.0 * v) + x.column(1).mapv(|v| -1.0 * v) + 0.5;
        let params = fit_ridge(x.view(), y.view(), 0.0).unwrap();
        assert_abs_diff_eq!(params.intercept, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(params.coefficients[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(params.coefficients[1], -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ridge_shrinks() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let ols = fit_ridge(x.view(), y.view(), 0.0).unwrap();
        let ridge = fit_ridge(x.view(), y.view(), 4.0).unwrap();
        assert!(ridge.coefficients[0].abs() < ols.coefficients[0].abs());
        // The intercept keeps the fit centered on the target mean
        let mean_x = array![2.5];
        assert_abs_diff_eq!(ridge.predict_row(mean_x.view()), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_constant_column_gets_zero() {
        let x = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0]];
        let y = array![1.0, 2.0, 3.0];
        let params = fit_ridge(x.view(), y.view(), 0.0).unwrap();
        assert_eq!(params.coefficients[1], 0.0);
        assert_abs_diff_eq!(params.coefficients[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_collinear_ols_is_singular() {
        let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        assert!(matches!(
            fit_ridge(x.view(), y.view(), 0.0),
            Err(ModelFitError::SingularSystem(_))
        ));
        // A positive penalty makes the system solvable
        assert!(fit_ridge(x.view(), y.view(), 1.0).is_ok());
    }
}
