//! End-to-end pipeline
//!
//! Runs every stage over one harmonized table:
//!
//! 1. validate the configuration
//! 2. build the training matrix over the reference periods
//! 3. compare the candidate variants under cross-validation
//! 4. refit the lowest-RMSE variant on the full training matrix
//! 5. permutation importance on the training matrix
//! 6. build the scoring panel (target where observed) and pick the cohort
//! 7. cluster the cohort and assess stability
//! 8. score vulnerability, with training history driving the cluster component
//! 9. collect exclusions and warnings

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use demora_data::{
    BuiltMatrix, DataIntegrityError, Exclusion, FeatureMatrix, FeatureMatrixBuilder, FeatureSchema,
    Warning,
};
use demora_forecast::{
    AttributionEngine, FittedModel, ForecastingEngine, ImportanceReport, VariantComparison,
};
use demora_output::ExportBundle;
use demora_risk::{ScoreSheet, VulnerabilityScorer};
use demora_typology::{ClusterAssignment, StabilityReport, TypologyEngine};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

/// Everything one run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Period that was clustered and scored
    pub scoring_period: i32,
    /// Ranked variant comparison
    pub comparison: VariantComparison,
    /// Selected variant refit on the full training matrix
    pub model: FittedModel,
    /// Permutation importance of `model`
    pub importance: ImportanceReport,
    /// Typology of the scoring cohort
    pub clusters: ClusterAssignment,
    /// Stability of the typology
    pub stability: StabilityReport,
    /// Vulnerability scores of the cohort
    pub scores: ScoreSheet,
    /// Rows dropped from the training matrix
    pub training_exclusions: Vec<Exclusion>,
    /// Rows dropped from the scoring panel
    pub scoring_exclusions: Vec<Exclusion>,
    /// Every warning of the run, in stage order
    pub warnings: Vec<Warning>,
}

impl PipelineOutput {
    /// Training and scoring exclusions together
    pub fn exclusions(&self) -> Vec<Exclusion> {
        self.training_exclusions
            .iter()
            .chain(&self.scoring_exclusions)
            .cloned()
            .collect()
    }

    /// Borrowed view for [`demora_output::ExportBundle::write_to_dir`]
    pub fn bundle<'a>(&'a self, exclusions: &'a [Exclusion]) -> ExportBundle<'a> {
        ExportBundle {
            comparison: &self.comparison,
            importance: &self.importance,
            clusters: &self.clusters,
            stability: &self.stability,
            scores: &self.scores,
            exclusions,
            warnings: &self.warnings,
        }
    }
}

/// Runs the modeling stages in order
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    schema: FeatureSchema,
}

impl Pipeline {
    /// Pipeline over the standard feature catalog
    ///
    /// # Errors
    /// Returns the first failed configuration check.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::with_schema(config, FeatureSchema::standard())
    }

    /// Pipeline over a custom declared schema; lag features are appended from
    /// the configuration
    pub fn with_schema(config: PipelineConfig, schema: FeatureSchema) -> Result<Self, PipelineError> {
        config.validate_against(&schema.with_lags(&config.lags))?;
        Ok(Self { config, schema })
    }

    /// Configuration
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on `inputs`
    pub fn run(&self, inputs: &DataFrame) -> Result<PipelineOutput, PipelineError> {
        let config = &self.config;
        let _run = info_span!("pipeline", seed = config.random_seed).entered();
        let builder = FeatureMatrixBuilder::new(self.schema.clone());
        let mut warnings = Vec::new();

        let training = {
            let _stage = info_span!("build_training").entered();
            builder.build(inputs, &config.training_build())?
        };
        warnings.extend(training.warnings.iter().cloned());

        let forecasting = ForecastingEngine::new(config.random_seed);
        let comparison = {
            let _stage = info_span!("compare_variants").entered();
            forecasting.compare_variants(
                &training.matrix,
                &config.model_variants,
                config.folds,
                config.split_strategy,
            )?
        };
        for ranked in &comparison.ranked {
            warnings.extend(ranked.result.warnings.iter().cloned());
        }
        let best = comparison.best().ok_or(PipelineError::NoViableVariant)?;
        info!(variant = %best.variant, rmse = best.result.rmse.mean, "selected variant");

        let model = {
            let _stage = info_span!("fit").entered();
            forecasting.fit(&training.matrix, &best.variant)?
        };

        let importance = {
            let _stage = info_span!("importance").entered();
            AttributionEngine::new(config.random_seed).permutation_importance(
                &model,
                &training.matrix,
                config.importance_repetitions,
            )?
        };

        let scoring = {
            let _stage = info_span!("build_scoring").entered();
            builder.build(inputs, &config.scoring_build())?
        };
        let scoring_period = match config.scoring_period {
            Some(period) => period,
            None => scoring
                .matrix
                .periods()
                .last()
                .copied()
                .ok_or_else(|| DataIntegrityError::EmptyMatrix("scoring panel".to_string()))?,
        };
        let panel = self.scoring_panel(&scoring, scoring_period)?;
        let cohort = panel.for_period(scoring_period)?;
        info!(
            period = scoring_period,
            municipalities = cohort.nrows(),
            history_rows = panel.nrows() - cohort.nrows(),
            "selected scoring cohort"
        );

        let typology =
            TypologyEngine::new(config.random_seed).with_stability(config.stability());
        let (clusters, stability) = {
            let _stage = info_span!("typology").entered();
            let clusters = typology.cluster(
                &cohort,
                &config.feature_subset_for_clustering,
                config.k,
                &config.cluster_algorithm,
            )?;
            let stability = typology.assess_stability(
                &cohort,
                &config.feature_subset_for_clustering,
                config.k,
                &config.cluster_algorithm,
                config.resamples,
            )?;
            (clusters, stability)
        };
        warnings.extend(clusters.warnings.iter().cloned());
        warnings.extend(stability.warnings.iter().cloned());

        let scores = {
            let _stage = info_span!("score").entered();
            VulnerabilityScorer::new(config.scorer()).score(
                scoring_period,
                &panel,
                &model,
                &clusters,
                &config.scoring_weights,
            )?
        };
        warnings.extend(scores.warnings.iter().cloned());

        if !warnings.is_empty() {
            warn!(count = warnings.len(), "run finished with warnings");
        }
        info!(
            period = scoring_period,
            scored = scores.len(),
            "pipeline complete"
        );

        Ok(PipelineOutput {
            scoring_period,
            comparison,
            model,
            importance,
            clusters,
            stability,
            scores,
            training_exclusions: training.exclusions,
            scoring_exclusions: scoring.exclusions,
            warnings,
        })
    }

    /// Cohort rows plus the training-period history rows
    fn scoring_panel(
        &self,
        scoring: &BuiltMatrix,
        period: i32,
    ) -> Result<FeatureMatrix, PipelineError> {
        let reference = &self.config.reference_periods;
        let rows: Vec<usize> = scoring
            .matrix
            .keys()
            .iter()
            .enumerate()
            .filter(|(_, key)| {
                key.period == period || reference.is_empty() || reference.contains(&key.period)
            })
            .map(|(i, _)| i)
            .collect();
        Ok(scoring.matrix.select_rows(&rows)?)
    }
}
