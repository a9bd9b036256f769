//! Model variants
//!
//! A variant is a regression family plus every hyperparameter it needs.
//! Nothing is defaulted at fit time; an invalid value is rejected by
//! [`ModelVariant::validate`] before any training starts.

use crate::error::ModelFitError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Regression family with explicit hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelVariant {
    /// Predicts the training-target mean
    MeanBaseline,

    /// Ordinary least squares
    Linear,

    /// L2-penalized least squares on standardized features
    Ridge {
        /// Penalty strength (>= 0)
        alpha: f64,
    },

    /// L1-penalized least squares on standardized features
    Lasso {
        /// Penalty strength (>= 0)
        alpha: f64,
        /// Maximum coordinate-descent sweeps
        max_iterations: usize,
        /// Convergence threshold on the largest coefficient change
        tolerance: f64,
    },

    /// Bagged CART trees with per-split feature subsampling
    RandomForest {
        /// Number of trees
        n_estimators: usize,
        /// Maximum tree depth
        max_depth: usize,
        /// Minimum rows per leaf
        min_samples_leaf: usize,
        /// Features considered at each split
        max_features: usize,
        /// Seed for bootstrap samples and feature subsampling
        seed: u64,
    },

    /// Squared-loss gradient boosting over CART trees
    GradientBoosting {
        /// Number of boosting stages
        n_estimators: usize,
        /// Maximum tree depth
        max_depth: usize,
        /// Minimum rows per leaf
        min_samples_leaf: usize,
        /// Shrinkage applied to each stage, in (0, 1]
        learning_rate: f64,
    },
}

impl ModelVariant {
    /// Family name (`ridge`, `random_forest`, ...)
    pub const fn family(&self) -> &'static str {
        match self {
            Self::MeanBaseline => "mean_baseline",
            Self::Linear => "linear",
            Self::Ridge { .. } => "ridge",
            Self::Lasso { .. } => "lasso",
            Self::RandomForest { .. } => "random_forest",
            Self::GradientBoosting { .. } => "gradient_boosting",
        }
    }

    /// Check every hyperparameter
    ///
    /// # Errors
    /// Returns `InvalidHyperparameter` naming the first offending value.
    pub fn validate(&self) -> Result<(), ModelFitError> {
        let family = self.family();
        match *self {
            Self::MeanBaseline | Self::Linear => Ok(()),
            Self::Ridge { alpha } => check_alpha(family, alpha),
            Self::Lasso {
                alpha,
                max_iterations,
                tolerance,
            } => {
                check_alpha(family, alpha)?;
                if max_iterations == 0 {
                    return Err(ModelFitError::hyperparameter(family, "max_iterations must be >= 1"));
                }
                if !(tolerance.is_finite() && tolerance > 0.0) {
                    return Err(ModelFitError::hyperparameter(
                        family,
                        format!("tolerance must be positive, got {tolerance}"),
                    ));
                }
                Ok(())
            }
            Self::RandomForest {
                n_estimators,
                max_depth,
                min_samples_leaf,
                max_features,
                ..
            } => {
                check_trees(family, n_estimators, max_depth, min_samples_leaf)?;
                if max_features == 0 {
                    return Err(ModelFitError::hyperparameter(family, "max_features must be >= 1"));
                }
                Ok(())
            }
            Self::GradientBoosting {
                n_estimators,
                max_depth,
                min_samples_leaf,
                learning_rate,
            } => {
                check_trees(family, n_estimators, max_depth, min_samples_leaf)?;
                if !(learning_rate > 0.0 && learning_rate <= 1.0) {
                    return Err(ModelFitError::hyperparameter(
                        family,
                        format!("learning_rate must be in (0, 1], got {learning_rate}"),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Minimum number of training rows for `n_features` features
    pub const fn min_rows(&self, n_features: usize) -> usize {
        match *self {
            Self::MeanBaseline => 1,
            Self::Linear => n_features + 1,
            Self::Ridge { .. } | Self::Lasso { .. } => 2,
            Self::RandomForest {
                min_samples_leaf, ..
            }
            | Self::GradientBoosting {
                min_samples_leaf, ..
            } => 2 * min_samples_leaf,
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MeanBaseline | Self::Linear => write!(f, "{}", self.family()),
            Self::Ridge { alpha } => write!(f, "ridge(alpha={alpha})"),
            Self::Lasso { alpha, .. } => write!(f, "lasso(alpha={alpha})"),
            Self::RandomForest {
                n_estimators,
                max_depth,
                max_features,
                ..
            } => write!(
                f,
                "random_forest(trees={n_estimators}, depth={max_depth}, features={max_features})"
            ),
            Self::GradientBoosting {
                n_estimators,
                max_depth,
                learning_rate,
                ..
            } => write!(
                f,
                "gradient_boosting(stages={n_estimators}, depth={max_depth}, rate={learning_rate})"
            ),
        }
    }
}

fn check_alpha(family: &str, alpha: f64) -> Result<(), ModelFitError> {
    if alpha.is_finite() && alpha >= 0.0 {
        Ok(())
    } else {
        Err(ModelFitError::hyperparameter(
            family,
            format!("alpha must be finite and >= 0, got {alpha}"),
        ))
    }
}

fn check_trees(
    family: &str,
    n_estimators: usize,
    max_depth: usize,
    min_samples_leaf: usize,
) -> Result<(), ModelFitError> {
    if n_estimators == 0 {
        return Err(ModelFitError::hyperparameter(family, "n_estimators must be >= 1"));
    }
    if max_depth == 0 {
        return Err(ModelFitError::hyperparameter(family, "max_depth must be >= 1"));
    }
    if min_samples_leaf == 0 {
        return Err(ModelFitError::hyperparameter(family, "min_samples_leaf must be >= 1"));
    }
    Ok(())
}
