//! Pipeline configuration
//!
//! Loaded from JSON. Missing keys take the values of
//! [`PipelineConfig::example`]; [`PipelineConfig::validate`] runs every
//! fail-fast check before any computation starts.

use crate::error::PipelineError;
use demora_data::schema::{
    AGE_DEPENDENCY_RATIO, EARTHQUAKE_EXPOSURE, FERTILITY_RATE, HURRICANE_EXPOSURE,
    LABOR_FORCE_PARTICIPATION, MEDIAN_AGE, MEDIAN_HOUSEHOLD_INCOME, POVERTY_RATE,
    UNEMPLOYMENT_RATE,
};
use demora_data::{BuildConfig, ConfigurationError, FeatureSchema, TargetMode};
use demora_forecast::{ModelVariant, SplitStrategy};
use demora_risk::{IndicatorSpec, Normalization, ScorerConfig, ScoringWeights};
use demora_typology::{AgreementMetric, ClusterAlgorithm, Perturbation, StabilityConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Options of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Periods ahead the target looks
    pub horizon: usize,
    /// Training periods (empty = every period with an observed target)
    pub reference_periods: Vec<i32>,
    /// Population lags added as features
    pub lags: Vec<usize>,
    /// Cross-validation split
    pub split_strategy: SplitStrategy,
    /// Cross-validation folds
    pub folds: usize,
    /// Candidate regression variants
    pub model_variants: Vec<ModelVariant>,
    /// Features used for the typology
    pub feature_subset_for_clustering: Vec<String>,
    /// Number of typology clusters
    pub k: usize,
    /// Clustering algorithm
    pub cluster_algorithm: ClusterAlgorithm,
    /// Stability perturbations (bootstrap draws)
    pub resamples: usize,
    /// Stability perturbation scheme
    pub stability_perturbation: Perturbation,
    /// Stability agreement metric
    pub agreement_metric: AgreementMetric,
    /// Mean agreement below which the typology is flagged unstable
    pub unstable_threshold: f64,
    /// Composite score weights
    pub scoring_weights: ScoringWeights,
    /// Indicators of the indicator component
    pub indicators: Vec<IndicatorSpec>,
    /// Normalization of the score components
    pub normalization: Normalization,
    /// Permutations per feature for importance
    pub importance_repetitions: usize,
    /// Period to score (default: latest input period)
    pub scoring_period: Option<i32>,
    /// Root seed of every random stream
    pub random_seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::example()
    }
}

impl PipelineConfig {
    /// Complete sample configuration for the standard feature catalog
    pub fn example() -> Self {
        Self {
            horizon: 1,
            reference_periods: Vec::new(),
            lags: vec![1],
            split_strategy: SplitStrategy::RandomKFold,
            folds: 5,
            model_variants: vec![
                ModelVariant::MeanBaseline,
                ModelVariant::Linear,
                ModelVariant::Ridge { alpha: 1.0 },
                ModelVariant::Lasso {
                    alpha: 0.05,
                    max_iterations: 1000,
                    tolerance: 1e-6,
                },
                ModelVariant::RandomForest {
                    n_estimators: 100,
                    max_depth: 6,
                    min_samples_leaf: 2,
                    max_features: 4,
                    seed: 42,
                },
                ModelVariant::GradientBoosting {
                    n_estimators: 100,
                    max_depth: 3,
                    min_samples_leaf: 2,
                    learning_rate: 0.1,
                },
            ],
            feature_subset_for_clustering: [
                FERTILITY_RATE,
                MEDIAN_AGE,
                AGE_DEPENDENCY_RATIO,
                LABOR_FORCE_PARTICIPATION,
                UNEMPLOYMENT_RATE,
                POVERTY_RATE,
                MEDIAN_HOUSEHOLD_INCOME,
            ]
            .map(str::to_string)
            .to_vec(),
            k: 4,
            cluster_algorithm: ClusterAlgorithm::default(),
            resamples: 20,
            stability_perturbation: Perturbation::Bootstrap,
            agreement_metric: AgreementMetric::AdjustedRand,
            unstable_threshold: 0.6,
            scoring_weights: ScoringWeights::default(),
            indicators: vec![
                IndicatorSpec::higher(AGE_DEPENDENCY_RATIO, 1.0),
                IndicatorSpec::higher(POVERTY_RATE, 1.0),
                IndicatorSpec::lower(MEDIAN_HOUSEHOLD_INCOME, 0.5),
                IndicatorSpec::higher(HURRICANE_EXPOSURE, 0.5),
                IndicatorSpec::higher(EARTHQUAKE_EXPOSURE, 0.5),
            ],
            normalization: Normalization::MinMax,
            importance_repetitions: 10,
            scoring_period: None,
            random_seed: 42,
        }
    }

    /// Load a JSON configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse a JSON configuration
    ///
    /// # Errors
    /// [`ConfigurationError::UnknownOption`] when an enumerated option holds
    /// an unknown value; [`PipelineError::Json`] for any other parse failure.
    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        let value: Value = serde_json::from_str(text)?;
        Self::deserialize(&value).map_err(|err| {
            unknown_variant(&err).map_or_else(
                || err.into(),
                |unknown| {
                    ConfigurationError::UnknownOption {
                        name: option_holding(&value, &unknown),
                        value: unknown,
                    }
                    .into()
                },
            )
        })
    }

    /// Pretty JSON rendering
    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Schema of the built matrices: the standard catalog plus lags
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::standard().with_lags(&self.lags)
    }

    /// Validate against the schema of [`Self::schema`]
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.validate_against(&self.schema())
    }

    /// Fail-fast checks of every option against `schema`
    pub fn validate_against(&self, schema: &FeatureSchema) -> Result<(), ConfigurationError> {
        self.training_build().validate()?;
        if self.folds < 2 {
            return Err(ConfigurationError::InvalidFolds(self.folds));
        }
        if self.k < 2 {
            return Err(ConfigurationError::InvalidClusterCount(self.k));
        }
        if self.model_variants.is_empty() {
            return Err(ConfigurationError::invalid(
                "model_variants",
                "at least one variant is required",
            ));
        }
        for variant in &self.model_variants {
            variant.validate().map_err(|err| {
                ConfigurationError::invalid("model_variants", err.to_string())
            })?;
        }
        if self.feature_subset_for_clustering.is_empty() {
            return Err(ConfigurationError::invalid(
                "feature_subset_for_clustering",
                "at least one feature is required",
            ));
        }
        if let Some(unknown) = self
            .feature_subset_for_clustering
            .iter()
            .find(|f| !schema.contains(f))
        {
            return Err(ConfigurationError::UnknownFeature(unknown.clone()));
        }
        self.cluster_algorithm.validate()?;
        self.stability().validate()?;
        if self.importance_repetitions == 0 {
            return Err(ConfigurationError::invalid(
                "importance_repetitions",
                "must be >= 1",
            ));
        }
        self.scoring_weights.validate()?;
        self.scorer().validate_against(schema)?;
        Ok(())
    }

    /// Build options of the training matrix
    pub fn training_build(&self) -> BuildConfig {
        BuildConfig::training(self.horizon, self.reference_periods.clone())
            .with_lags(self.lags.clone())
    }

    /// Build options of the panel the scoring cohort and history come from
    pub fn scoring_build(&self) -> BuildConfig {
        BuildConfig::training(self.horizon, Vec::new())
            .with_lags(self.lags.clone())
            .with_target(TargetMode::WhereAvailable)
    }

    /// Stability options
    pub const fn stability(&self) -> StabilityConfig {
        StabilityConfig {
            perturbation: self.stability_perturbation,
            metric: self.agreement_metric,
            unstable_threshold: self.unstable_threshold,
        }
    }

    /// Scorer options
    pub fn scorer(&self) -> ScorerConfig {
        ScorerConfig {
            indicators: self.indicators.clone(),
            normalization: self.normalization,
        }
    }
}

/// Value named by a serde "unknown variant `x`, expected ..." error
fn unknown_variant(err: &serde_json::Error) -> Option<String> {
    let message = err.to_string();
    let rest = message.strip_prefix("unknown variant `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

/// Top-level key whose value contains the string `needle`
fn option_holding(config: &Value, needle: &str) -> String {
    fn contains(value: &Value, needle: &str) -> bool {
        match value {
            Value::String(s) => s == needle,
            Value::Array(items) => items.iter().any(|v| contains(v, needle)),
            Value::Object(map) => map.values().any(|v| contains(v, needle)),
            _ => false,
        }
    }
    config
        .as_object()
        .and_then(|map| map.iter().find(|(_, v)| contains(v, needle)))
        .map_or_else(|| "config".to_string(), |(key, _)| key.clone())
}
