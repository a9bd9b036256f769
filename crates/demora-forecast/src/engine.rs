//! Forecasting engine
//!
//! Fits variants, predicts with fitted models, and ranks a set of variants
//! by cross-validated RMSE.

use crate::cv::{CrossValidationHarness, CvResult, SplitStrategy};
use crate::error::ModelFitError;
use crate::fitted::FittedModel;
use crate::learners::fit_params;
use crate::variant::ModelVariant;
use demora_data::{ConfigurationError, FeatureMatrix};
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A variant with its cross-validation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedVariant {
    /// 1-based rank (1 = lowest mean RMSE)
    pub rank: usize,
    /// Evaluated variant
    pub variant: ModelVariant,
    /// Cross-validation result
    pub result: CvResult,
}

/// A variant that could not be evaluated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantFailure {
    /// Failing variant
    pub variant: ModelVariant,
    /// Error message
    pub reason: String,
}

/// Output of [`ForecastingEngine::compare_variants`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantComparison {
    /// Successful variants, ascending by mean RMSE (ties keep input order)
    pub ranked: Vec<RankedVariant>,
    /// Variants that failed, in input order
    pub failures: Vec<VariantFailure>,
}

impl VariantComparison {
    /// Lowest-RMSE variant, if any succeeded
    pub fn best(&self) -> Option<&RankedVariant> {
        self.ranked.first()
    }
}

/// Fits, predicts, and compares regression variants
#[derive(Debug, Clone, Copy)]
pub struct ForecastingEngine {
    harness: CrossValidationHarness,
}

impl ForecastingEngine {
    /// Create an engine whose cross-validation splits derive from `seed`
    pub const fn new(seed: u64) -> Self {
        Self {
            harness: CrossValidationHarness::new(seed),
        }
    }

    /// Cross-validation harness used by [`Self::compare_variants`]
    pub const fn harness(&self) -> &CrossValidationHarness {
        &self.harness
    }

    /// Fit `variant` on every row of `matrix`
    ///
    /// # Errors
    /// * `InvalidHyperparameter` for an invalid variant
    /// * `MissingTarget` when the target is absent or incomplete
    /// * `MissingValues` when any feature value is missing
    /// * `InsufficientRows` below the variant's minimum
    /// * `SingularSystem` when the normal equations cannot be solved
    pub fn fit(
        &self,
        matrix: &FeatureMatrix,
        variant: &ModelVariant,
    ) -> Result<FittedModel, ModelFitError> {
        fit_model(matrix, variant)
    }

    /// Predictions aligned to the rows of `matrix`
    ///
    /// # Errors
    /// * `SchemaMismatch` when the features differ from the training features
    /// * `MissingValues` when any feature value is missing
    pub fn predict(
        &self,
        fitted: &FittedModel,
        matrix: &FeatureMatrix,
    ) -> Result<Array1<f64>, ModelFitError> {
        fitted.predict(matrix)
    }

    /// Cross-validate every variant and rank by mean RMSE
    ///
    /// A variant that fails is reported in `failures` and left out of the
    /// ranking; it never aborts the comparison.
    ///
    /// # Errors
    /// `Configuration` when `folds < 2` or `variants` is empty.
    pub fn compare_variants(
        &self,
        matrix: &FeatureMatrix,
        variants: &[ModelVariant],
        folds: usize,
        strategy: SplitStrategy,
    ) -> Result<VariantComparison, ModelFitError> {
        if folds < 2 {
            return Err(ConfigurationError::InvalidFolds(folds).into());
        }
        if variants.is_empty() {
            return Err(
                ConfigurationError::invalid("model_variants", "at least one variant is required")
                    .into(),
            );
        }

        let results: Vec<Result<CvResult, ModelFitError>> = variants
            .par_iter()
            .map(|variant| self.harness.evaluate(matrix, variant, folds, strategy))
            .collect();

        let mut scored = Vec::new();
        let mut failures = Vec::new();
        for (variant, result) in variants.iter().zip(results) {
            match result {
                Ok(result) => scored.push((variant.clone(), result)),
                Err(err) => {
                    warn!(variant = %variant, error = %err, "variant failed cross-validation");
                    failures.push(VariantFailure {
                        variant: variant.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        // Stable sort keeps input order among equal scores
        scored.sort_by(|a, b| a.1.rmse.mean.total_cmp(&b.1.rmse.mean));
        let ranked: Vec<RankedVariant> = scored
            .into_iter()
            .enumerate()
            .map(|(i, (variant, result))| RankedVariant {
                rank: i + 1,
                variant,
                result,
            })
            .collect();

        if let Some(best) = ranked.first() {
            info!(
                best = %best.variant,
                mean_rmse = best.result.rmse.mean,
                evaluated = ranked.len(),
                failed = failures.len(),
                "compared model variants"
            );
        }

        Ok(VariantComparison { ranked, failures })
    }
}

/// Shared by the engine and the cross-validation folds
pub(crate) fn fit_model(
    matrix: &FeatureMatrix,
    variant: &ModelVariant,
) -> Result<FittedModel, ModelFitError> {
    variant.validate()?;
    let target = matrix
        .target()
        .ok_or_else(|| ModelFitError::MissingTarget("matrix has no target column".to_string()))?;
    let missing_target = matrix.missing_target_count();
    if missing_target > 0 {
        return Err(ModelFitError::MissingTarget(format!(
            "{missing_target} rows have no target"
        )));
    }
    let count = matrix.missing_feature_count();
    if count > 0 {
        return Err(ModelFitError::MissingValues { count });
    }
    let required = variant.min_rows(matrix.nfeatures());
    if matrix.nrows() < required {
        return Err(ModelFitError::InsufficientRows {
            variant: variant.to_string(),
            required,
            actual: matrix.nrows(),
        });
    }

    let params = fit_params(variant, matrix.features().view(), target.view())?;
    debug!(variant = %variant, rows = matrix.nrows(), "fitted model");

    Ok(FittedModel::new(
        variant.clone(),
        matrix.feature_names().into_iter().map(str::to_string).collect(),
        matrix.nrows(),
        params,
    ))
}
