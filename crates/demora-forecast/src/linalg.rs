//! Dense linear algebra used by the linear learners
//!
//! Only what the normal equations need: a Cholesky factorization of a
//! symmetric positive-definite matrix and the matching triangular solves.

use crate::error::ModelFitError;
use ndarray::{Array1, Array2};

/// Relative pivot threshold below which a matrix is treated as singular
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Lower-triangular Cholesky factor `L` with `A = L L^T`
///
/// # Errors
/// Returns `SingularSystem` when `A` is not square or a pivot falls below
/// `PIVOT_TOLERANCE` times the largest diagonal entry.
pub fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>, ModelFitError> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(ModelFitError::SingularSystem(format!(
            "matrix is {}x{}, not square",
            n,
            a.ncols()
        )));
    }

    let scale = a.diag().iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);
    let mut l = Array2::<f64>::zeros((n, n));

    for j in 0..n {
        let mut pivot = a[[j, j]];
        for k in 0..j {
            pivot -= l[[j, k]] * l[[j, k]];
        }
        if !(pivot > PIVOT_TOLERANCE * scale) {
            return Err(ModelFitError::SingularSystem(format!(
                "pivot {pivot:.3e} at column {j}"
            )));
        }
        let diag = pivot.sqrt();
        l[[j, j]] = diag;

        for i in (j + 1)..n {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = sum / diag;
        }
    }

    Ok(l)
}

/// Solve `A x = b` for symmetric positive-definite `A`
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, ModelFitError> {
    let n = a.nrows();
    if b.len() != n {
        return Err(ModelFitError::SingularSystem(format!(
            "right-hand side has {} entries for a {n}x{n} system",
            b.len()
        )));
    }
    let l = cholesky(a)?;

    // Forward: L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }

    // Backward: L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_cholesky_reconstructs() {
        let a = array![[4.0, 2.0, 0.4], [2.0, 5.0, 1.0], [0.4, 1.0, 3.0]];
        let l = cholesky(&a).unwrap();
        let back = l.dot(&l.t());
        for (x, y) in back.iter().zip(a.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_solve() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![1.0, 2.0];
        let x = cholesky_solve(&a, &b).unwrap();
        assert_abs_diff_eq!(x[0], 1.0 / 11.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 7.0 / 11.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(matches!(
            cholesky(&a),
            Err(ModelFitError::SingularSystem(_))
        ));
    }
}
