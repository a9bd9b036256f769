//! Fitted models
//!
//! A [`FittedModel`] pairs a variant with the parameters learned from one
//! training matrix, the ordered feature names it saw, and the training row
//! count. It is created by [`crate::ForecastingEngine::fit`] and never
//! mutated.

use crate::error::ModelFitError;
use crate::learners::{LinearParams, RegressionTree};
use crate::variant::ModelVariant;
use demora_data::FeatureMatrix;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Learned parameters, by family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelParams {
    /// Constant prediction
    Constant {
        /// Predicted value
        value: f64,
    },
    /// Linear model (OLS, ridge, lasso)
    Linear(LinearParams),
    /// Average of bagged trees
    Forest {
        /// Fitted trees
        trees: Vec<RegressionTree>,
    },
    /// Additive stages on top of an initial constant
    Boosting {
        /// Initial prediction (training-target mean)
        initial: f64,
        /// Shrinkage applied to each stage
        learning_rate: f64,
        /// Fitted stages
        trees: Vec<RegressionTree>,
    },
}

impl ModelParams {
    /// Prediction for one feature row
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        match self {
            Self::Constant { value } => *value,
            Self::Linear(params) => params.predict_row(row),
            Self::Forest { trees } => {
                trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / trees.len() as f64
            }
            Self::Boosting {
                initial,
                learning_rate,
                trees,
            } => {
                initial
                    + learning_rate * trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
            }
        }
    }
}

/// A variant with its learned parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    variant: ModelVariant,
    feature_names: Vec<String>,
    training_rows: usize,
    params: ModelParams,
}

impl FittedModel {
    pub(crate) const fn new(
        variant: ModelVariant,
        feature_names: Vec<String>,
        training_rows: usize,
        params: ModelParams,
    ) -> Self {
        Self {
            variant,
            feature_names,
            training_rows,
            params,
        }
    }

    /// Variant that was fitted
    pub const fn variant(&self) -> &ModelVariant {
        &self.variant
    }

    /// Feature names seen during training, in column order
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Number of training rows
    pub const fn training_rows(&self) -> usize {
        self.training_rows
    }

    /// Learned parameters
    pub const fn params(&self) -> &ModelParams {
        &self.params
    }

    /// `(feature, coefficient)` pairs for linear families
    pub fn coefficients(&self) -> Option<Vec<(&str, f64)>> {
        match &self.params {
            ModelParams::Linear(params) => Some(
                self.feature_names
                    .iter()
                    .map(String::as_str)
                    .zip(params.coefficients.iter().copied())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Predictions aligned to the rows of `matrix`
    ///
    /// # Errors
    /// * `SchemaMismatch` when the features differ from the training features
    /// * `MissingValues` when any feature value is missing
    pub fn predict(&self, matrix: &FeatureMatrix) -> Result<Array1<f64>, ModelFitError> {
        self.check_schema(matrix)?;
        let count = matrix.missing_feature_count();
        if count > 0 {
            return Err(ModelFitError::MissingValues { count });
        }
        Ok(self.predict_rows(matrix.features().view()))
    }

    /// Fail unless `matrix` has exactly the training features, in order
    pub(crate) fn check_schema(&self, matrix: &FeatureMatrix) -> Result<(), ModelFitError> {
        let actual = matrix.feature_names();
        if actual.len() == self.feature_names.len()
            && actual.iter().zip(&self.feature_names).all(|(a, e)| *a == e.as_str())
        {
            Ok(())
        } else {
            Err(ModelFitError::SchemaMismatch {
                expected: self.feature_names.clone(),
                actual: actual.into_iter().map(str::to_string).collect(),
            })
        }
    }

    /// Predictions for a feature block already known to match the schema
    pub(crate) fn predict_rows(&self, features: ArrayView2<'_, f64>) -> Array1<f64> {
        features
            .axis_iter(Axis(0))
            .map(|row| self.params.predict_row(row))
            .collect()
    }
}
