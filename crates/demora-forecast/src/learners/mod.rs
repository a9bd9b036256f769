//! Regression learners
//!
//! Each learner fits raw parameters from a dense feature block and a target
//! vector. Input validation (hyperparameters, row counts, missing values)
//! happens in [`crate::engine`] before any learner runs.

pub mod boosting;
pub mod forest;
pub mod lasso;
pub mod linear;
pub mod tree;

pub use linear::LinearParams;
pub use tree::{RegressionTree, TreeNode};

use crate::error::ModelFitError;
use crate::fitted::ModelParams;
use crate::variant::ModelVariant;
use ndarray::{ArrayView1, ArrayView2};
use tree::TreeConfig;

/// Fit the parameters of `variant` on `(x, y)`
pub(crate) fn fit_params(
    variant: &ModelVariant,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
) -> Result<ModelParams, ModelFitError> {
    let params = match *variant {
        ModelVariant::MeanBaseline => ModelParams::Constant {
            value: y.mean().unwrap_or(0.0),
        },
        ModelVariant::Linear => ModelParams::Linear(linear::fit_ridge(x, y, 0.0)?),
        ModelVariant::Ridge { alpha } => ModelParams::Linear(linear::fit_ridge(x, y, alpha)?),
        ModelVariant::Lasso {
            alpha,
            max_iterations,
            tolerance,
        } => ModelParams::Linear(lasso::fit_lasso(x, y, alpha, max_iterations, tolerance)),
        ModelVariant::RandomForest {
            n_estimators,
            max_depth,
            min_samples_leaf,
            max_features,
            seed,
        } => {
            if max_features > x.ncols() {
                return Err(ModelFitError::hyperparameter(
                    variant.family(),
                    format!(
                        "max_features {max_features} exceeds the {} available features",
                        x.ncols()
                    ),
                ));
            }
            let config = TreeConfig {
                max_depth,
                min_samples_leaf,
                max_features: Some(max_features),
            };
            ModelParams::Forest {
                trees: forest::fit_forest(x, y, n_estimators, &config, seed),
            }
        }
        ModelVariant::GradientBoosting {
            n_estimators,
            max_depth,
            min_samples_leaf,
            learning_rate,
        } => {
            let config = TreeConfig {
                max_depth,
                min_samples_leaf,
                max_features: None,
            };
            let (initial, trees) =
                boosting::fit_boosting(x, y, n_estimators, &config, learning_rate);
            ModelParams::Boosting {
                initial,
                learning_rate,
                trees,
            }
        }
    };
    Ok(params)
}
