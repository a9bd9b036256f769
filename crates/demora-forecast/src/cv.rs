//! Cross-validation
//!
//! Splits a training matrix into folds, trains a fresh model per fold, and
//! scores held-out MAE and RMSE.
//!
//! Two split strategies are supported:
//! - `random_k_fold`: row indices are shuffled with a seeded stream and row
//!   at shuffled position `i` lands in fold `i mod k`.
//! - `time_blocked`: the distinct periods are sorted and cut into `k + 1`
//!   contiguous blocks. Fold `f` trains on blocks `0..=f` and holds out block
//!   `f + 1`, so no training period is ever later than a held-out one.
//!
//! Folds without held-out or training rows are skipped with a warning rather
//! than failing the evaluation.

use crate::engine::fit_model;
use crate::error::ModelFitError;
use crate::metrics::{mae, rmse};
use crate::variant::ModelVariant;
use demora_data::{ConfigurationError, FeatureMatrix, SeedSequence, Summary, Warning};
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// How rows are assigned to folds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Seeded shuffle, fold = position mod k
    #[default]
    RandomKFold,
    /// Expanding window over contiguous period blocks
    TimeBlocked,
}

/// Row indices of one fold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldPlan {
    /// Fold index
    pub fold: usize,
    /// Training rows, ascending
    pub train: Vec<usize>,
    /// Held-out rows, ascending
    pub test: Vec<usize>,
}

/// Held-out scores of one fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    /// Fold index
    pub fold: usize,
    /// Training rows
    pub train_rows: usize,
    /// Held-out rows
    pub test_rows: usize,
    /// Mean absolute error on held-out rows
    pub mae: f64,
    /// Root mean squared error on held-out rows
    pub rmse: f64,
}

/// Cross-validated performance of one variant on one matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    /// Split strategy used
    pub strategy: SplitStrategy,
    /// Requested number of folds
    pub requested_folds: usize,
    /// Scored folds, by fold index
    pub folds: Vec<FoldScore>,
    /// Mean and population std of per-fold MAE
    pub mae: Summary,
    /// Mean and population std of per-fold RMSE
    pub rmse: Summary,
    /// Skipped-fold diagnostics
    pub warnings: Vec<Warning>,
}

enum FoldOutcome {
    Scored(FoldScore),
    Skipped(Warning),
}

/// Splits matrices into folds and scores variants on them
#[derive(Debug, Clone, Copy)]
pub struct CrossValidationHarness {
    seeds: SeedSequence,
}

impl CrossValidationHarness {
    /// Create a harness whose random splits derive from `seed`
    pub const fn new(seed: u64) -> Self {
        Self {
            seeds: SeedSequence::new(seed),
        }
    }

    /// Assign rows to folds
    ///
    /// Returns exactly `folds` plans; some may be empty when the matrix has
    /// fewer rows (or periods) than the split needs.
    ///
    /// # Errors
    /// `InvalidFolds` when `folds < 2`.
    pub fn split(
        &self,
        matrix: &FeatureMatrix,
        folds: usize,
        strategy: SplitStrategy,
    ) -> Result<Vec<FoldPlan>, ConfigurationError> {
        if folds < 2 {
            return Err(ConfigurationError::InvalidFolds(folds));
        }
        let plans = match strategy {
            SplitStrategy::RandomKFold => self.random_k_fold(matrix.nrows(), folds),
            SplitStrategy::TimeBlocked => time_blocked(matrix, folds),
        };
        Ok(plans)
    }

    fn random_k_fold(&self, n_rows: usize, folds: usize) -> Vec<FoldPlan> {
        let mut order: Vec<usize> = (0..n_rows).collect();
        order.shuffle(&mut self.seeds.rng("cv-folds", 0));

        let mut fold_of = vec![0; n_rows];
        for (position, &row) in order.iter().enumerate() {
            fold_of[row] = position % folds;
        }

        (0..folds)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..n_rows).partition(|&row| fold_of[row] == fold);
                FoldPlan { fold, train, test }
            })
            .collect()
    }

    /// Cross-validate one variant
    ///
    /// # Errors
    /// * `Configuration` when `folds < 2`
    /// * `InvalidHyperparameter` for an invalid variant
    /// * `MissingTarget` / `MissingValues` for incomplete data
    /// * `NoScorableFolds` when every fold is skipped
    pub fn evaluate(
        &self,
        matrix: &FeatureMatrix,
        variant: &ModelVariant,
        folds: usize,
        strategy: SplitStrategy,
    ) -> Result<CvResult, ModelFitError> {
        variant.validate()?;
        let plans = self.split(matrix, folds, strategy)?;
        if !matrix.has_target() {
            return Err(ModelFitError::MissingTarget(
                "matrix has no target column".to_string(),
            ));
        }

        let outcomes = plans
            .par_iter()
            .map(|plan| score_fold(matrix, variant, plan))
            .collect::<Result<Vec<_>, _>>()?;

        let mut scores = Vec::with_capacity(outcomes.len());
        let mut warnings = Vec::new();
        for outcome in outcomes {
            match outcome {
                FoldOutcome::Scored(score) => scores.push(score),
                FoldOutcome::Skipped(warning) => {
                    warn!(variant = %variant, %warning, "cross-validation fold skipped");
                    warnings.push(warning);
                }
            }
        }

        let maes: Vec<f64> = scores.iter().map(|s| s.mae).collect();
        let rmses: Vec<f64> = scores.iter().map(|s| s.rmse).collect();
        let (Some(mae), Some(rmse)) = (Summary::from_values(&maes), Summary::from_values(&rmses))
        else {
            return Err(ModelFitError::NoScorableFolds(warnings.len()));
        };

        info!(
            variant = %variant,
            ?strategy,
            folds = scores.len(),
            mean_rmse = rmse.mean,
            mean_mae = mae.mean,
            "cross-validation finished"
        );

        Ok(CvResult {
            strategy,
            requested_folds: folds,
            folds: scores,
            mae,
            rmse,
            warnings,
        })
    }
}

/// Expanding-window folds over contiguous period blocks
fn time_blocked(matrix: &FeatureMatrix, folds: usize) -> Vec<FoldPlan> {
    let periods = matrix.periods();
    let n_blocks = folds + 1;
    let block_of: HashMap<i32, usize> = periods
        .iter()
        .enumerate()
        .map(|(i, &p)| (p, i * n_blocks / periods.len()))
        .collect();
    let row_blocks: Vec<usize> = matrix
        .keys()
        .iter()
        .map(|k| block_of.get(&k.period).copied().unwrap_or(0))
        .collect();

    (0..folds)
        .map(|fold| {
            let train = (0..row_blocks.len())
                .filter(|&r| row_blocks[r] <= fold)
                .collect();
            let test = (0..row_blocks.len())
                .filter(|&r| row_blocks[r] == fold + 1)
                .collect();
            FoldPlan { fold, train, test }
        })
        .collect()
}

fn score_fold(
    matrix: &FeatureMatrix,
    variant: &ModelVariant,
    plan: &FoldPlan,
) -> Result<FoldOutcome, ModelFitError> {
    let skip = |reason: String| {
        Ok(FoldOutcome::Skipped(Warning::SkippedFold {
            fold: plan.fold,
            reason,
        }))
    };
    if plan.test.is_empty() {
        return skip("no held-out rows".to_string());
    }
    if plan.train.is_empty() {
        return skip("no training rows".to_string());
    }

    let train = matrix.select_rows(&plan.train)?;
    let test = matrix.select_rows(&plan.test)?;
    let model = match fit_model(&train, variant) {
        Ok(model) => model,
        Err(err @ ModelFitError::InsufficientRows { .. }) => return skip(err.to_string()),
        Err(err) => return Err(err),
    };

    let predicted = model.predict_rows(test.features().view());
    let actual = test
        .target()
        .ok_or_else(|| ModelFitError::MissingTarget("held-out rows have no target".to_string()))?;
    let score = FoldScore {
        fold: plan.fold,
        train_rows: train.nrows(),
        test_rows: test.nrows(),
        mae: mae(actual.view(), predicted.view()),
        rmse: rmse(actual.view(), predicted.view()),
    };
    debug!(fold = plan.fold, rmse = score.rmse, "scored fold");
    Ok(FoldOutcome::Scored(score))
}
