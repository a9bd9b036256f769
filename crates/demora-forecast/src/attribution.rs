//! Permutation importance
//!
//! The score of a model on an evaluation matrix is `-RMSE`. For each feature
//! the column is shuffled, the model re-predicts, and the drop
//! `baseline - permuted` is recorded; repeating the shuffle gives a mean and
//! a population standard deviation per feature.
//!
//! Each feature draws from a stream keyed by its name, so its permutations
//! depend neither on column order nor on how rayon schedules the features.

use crate::error::ModelFitError;
use crate::fitted::FittedModel;
use crate::metrics::rmse;
use demora_data::{ConfigurationError, FeatureMatrix, SeedSequence, Summary};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Score drop statistics for one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    /// Feature name
    pub feature: String,
    /// Mean score drop
    pub mean: f64,
    /// Population standard deviation of the score drop
    pub std: f64,
    /// Score drop of each repetition
    pub drops: Vec<f64>,
}

/// Permutation importance of every feature of one fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceReport {
    /// `-RMSE` on the unpermuted evaluation matrix
    pub baseline_score: f64,
    /// Shuffles per feature
    pub repetitions: usize,
    /// One entry per feature, in schema order
    pub features: Vec<FeatureImportance>,
}

impl ImportanceReport {
    /// Importance of a named feature
    pub fn get(&self, feature: &str) -> Option<&FeatureImportance> {
        self.features.iter().find(|f| f.feature == feature)
    }

    /// Features by descending mean drop (ties keep schema order)
    pub fn ranked(&self) -> Vec<&FeatureImportance> {
        let mut ranked: Vec<&FeatureImportance> = self.features.iter().collect();
        ranked.sort_by(|a, b| b.mean.total_cmp(&a.mean));
        ranked
    }
}

/// Computes permutation importance
#[derive(Debug, Clone, Copy)]
pub struct AttributionEngine {
    seeds: SeedSequence,
}

impl AttributionEngine {
    /// Create an engine whose shuffles derive from `seed`
    pub const fn new(seed: u64) -> Self {
        Self {
            seeds: SeedSequence::new(seed),
        }
    }

    /// Permutation importance of `fitted` on `matrix`
    ///
    /// # Errors
    /// * `Configuration` when `repetitions == 0`
    /// * `SchemaMismatch` when `matrix` has different features than training
    /// * `MissingTarget` / `MissingValues` for incomplete evaluation data
    pub fn permutation_importance(
        &self,
        fitted: &FittedModel,
        matrix: &FeatureMatrix,
        repetitions: usize,
    ) -> Result<ImportanceReport, ModelFitError> {
        if repetitions == 0 {
            return Err(ConfigurationError::invalid(
                "importance_repetitions",
                "at least one repetition is required",
            )
            .into());
        }
        fitted.check_schema(matrix)?;
        let target = matrix.target().ok_or_else(|| {
            ModelFitError::MissingTarget("evaluation matrix has no target column".to_string())
        })?;
        if matrix.missing_target_count() > 0 {
            return Err(ModelFitError::MissingTarget(
                "evaluation matrix has rows without a target".to_string(),
            ));
        }
        let count = matrix.missing_feature_count();
        if count > 0 {
            return Err(ModelFitError::MissingValues { count });
        }

        let features = matrix.features();
        let baseline = -rmse(target.view(), fitted.predict_rows(features.view()).view());
        let n = matrix.nrows();
        let names = matrix.feature_names();
        let streams = self.seeds.child("permutation", 0);

        let importances: Vec<FeatureImportance> = names
            .par_iter()
            .enumerate()
            .map(|(j, name)| {
                let mut rng = streams.rng(name, 0);
                let original = features.column(j).to_owned();
                let mut permuted = features.clone();
                let mut order: Vec<usize> = (0..n).collect();

                let drops: Vec<f64> = (0..repetitions)
                    .map(|_| {
                        order.shuffle(&mut rng);
                        let shuffled: Array1<f64> = order.iter().map(|&r| original[r]).collect();
                        permuted.column_mut(j).assign(&shuffled);
                        let score =
                            -rmse(target.view(), fitted.predict_rows(permuted.view()).view());
                        baseline - score
                    })
                    .collect();

                let summary = Summary::from_values(&drops).unwrap_or(Summary {
                    mean: 0.0,
                    std: 0.0,
                });
                debug!(feature = *name, mean = summary.mean, "permutation importance");
                FeatureImportance {
                    feature: (*name).to_string(),
                    mean: summary.mean,
                    std: summary.std,
                    drops,
                }
            })
            .collect();

        info!(
            features = importances.len(),
            repetitions,
            baseline_score = baseline,
            "computed permutation importance"
        );

        Ok(ImportanceReport {
            baseline_score: baseline,
            repetitions,
            features: importances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ForecastingEngine;
    use crate::variant::ModelVariant;
    use approx::assert_abs_diff_eq;
    use demora_data::{FeatureSchema, ObservationKey};
    use ndarray::Array2;
    use rand::Rng;

    /// Target plus two noise features, one exact copy of the target, one constant
    fn matrix_with_duplicate(n: usize) -> FeatureMatrix {
        let mut rng = SeedSequence::new(17).rng("fixture", 0);
        let mut values = Vec::with_capacity(n * 4);
        let mut target = Vec::with_capacity(n);
        for _ in 0..n {
            let y: f64 = rng.gen_range(-5.0..5.0);
            values.extend([rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0), y, 4.0]);
            target.push(y);
        }
        let keys = (0..n)
            .map(|i| ObservationKey::new(format!("m{i:03}"), 2020))
            .collect();
        FeatureMatrix::new(
            FeatureSchema::unbounded(&["noise_a", "noise_b", "copy", "constant"]),
            keys,
            Array2::from_shape_vec((n, 4), values).unwrap(),
            Some(Array1::from_vec(target)),
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_of_target_ranks_first() {
        let m = matrix_with_duplicate(200);
        let fitted = ForecastingEngine::new(0)
            .fit(&m, &ModelVariant::Linear)
            .unwrap();
        let report = AttributionEngine::new(9)
            .permutation_importance(&fitted, &m, 10)
            .unwrap();

        let top = report.ranked()[0];
        assert_eq!(top.feature, "copy");
        assert!(top.mean > 0.0);
        assert!(top.std / top.mean < 0.2);
        assert_eq!(top.drops.len(), 10);
        assert_abs_diff_eq!(report.baseline_score, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_constant_feature_has_no_importance() {
        let m = matrix_with_duplicate(50);
        let fitted = ForecastingEngine::new(0)
            .fit(&m, &ModelVariant::Ridge { alpha: 1.0 })
            .unwrap();
        let report = AttributionEngine::new(1)
            .permutation_importance(&fitted, &m, 5)
            .unwrap();
        let constant = report.get("constant").unwrap();
        assert_abs_diff_eq!(constant.mean, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(constant.std, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_importance_is_reproducible() {
        let m = matrix_with_duplicate(40);
        let fitted = ForecastingEngine::new(0)
            .fit(&m, &ModelVariant::Linear)
            .unwrap();
        let a = AttributionEngine::new(5)
            .permutation_importance(&fitted, &m, 3)
            .unwrap();
        let b = AttributionEngine::new(5)
            .permutation_importance(&fitted, &m, 3)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_column_order_does_not_change_permutations() {
        let m = matrix_with_duplicate(60);
        let reordered = m
            .select_features(&["constant", "copy", "noise_b", "noise_a"])
            .unwrap();
        let engine = ForecastingEngine::new(0);
        let a = AttributionEngine::new(3)
            .permutation_importance(&engine.fit(&m, &ModelVariant::Linear).unwrap(), &m, 4)
            .unwrap();
        let b = AttributionEngine::new(3)
            .permutation_importance(
                &engine.fit(&reordered, &ModelVariant::Linear).unwrap(),
                &reordered,
                4,
            )
            .unwrap();

        for feature in ["noise_a", "noise_b", "copy"] {
            let (x, y) = (a.get(feature).unwrap(), b.get(feature).unwrap());
            assert_eq!(x.drops.len(), y.drops.len());
            for (dx, dy) in x.drops.iter().zip(&y.drops) {
                assert_abs_diff_eq!(dx, dy, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_rejects_zero_repetitions_and_missing_target() {
        let m = matrix_with_duplicate(20);
        let fitted = ForecastingEngine::new(0)
            .fit(&m, &ModelVariant::Linear)
            .unwrap();
        let engine = AttributionEngine::new(0);
        assert!(matches!(
            engine.permutation_importance(&fitted, &m, 0),
            Err(ModelFitError::Configuration(_))
        ));
        assert!(matches!(
            engine.permutation_importance(&fitted, &m.without_target(), 2),
            Err(ModelFitError::MissingTarget(_))
        ));
    }
}
