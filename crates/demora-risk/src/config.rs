//! Scoring weights and indicator configuration.

use demora_data::schema::{
    AGE_DEPENDENCY_RATIO, EARTHQUAKE_EXPOSURE, HURRICANE_EXPOSURE, POVERTY_RATE,
};
use demora_data::{ConfigurationError, FeatureSchema};
use serde::{Deserialize, Serialize};

/// Tolerance on the sum of the component weights
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Component weights of the composite score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of the forecast component
    pub forecast: f64,
    /// Weight of the cluster component
    pub cluster: f64,
    /// Weight of the indicator component
    pub indicator: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            forecast: 0.4,
            cluster: 0.3,
            indicator: 0.3,
        }
    }
}

impl ScoringWeights {
    /// Create weights; call [`ScoringWeights::validate`] before use
    pub const fn new(forecast: f64, cluster: f64, indicator: f64) -> Self {
        Self {
            forecast,
            cluster,
            indicator,
        }
    }

    /// Weights must be finite, nonnegative, and sum to one
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("forecast", self.forecast),
            ("cluster", self.cluster),
            ("indicator", self.indicator),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::InvalidWeight {
                    name: name.to_string(),
                    value,
                });
            }
        }
        let sum = self.forecast + self.cluster + self.indicator;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigurationError::WeightsDoNotSumToOne { sum });
        }
        Ok(())
    }
}

/// Orientation of a raw indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Larger raw values mean more risk
    #[default]
    HigherIsRiskier,
    /// Smaller raw values mean more risk
    LowerIsRiskier,
}

/// One raw indicator of the indicator component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    /// Feature name in the matrix schema
    pub feature: String,
    /// Relative weight within the indicator component
    pub weight: f64,
    /// Orientation
    #[serde(default)]
    pub direction: Direction,
}

impl IndicatorSpec {
    /// Indicator where higher values are riskier
    pub fn higher(feature: impl Into<String>, weight: f64) -> Self {
        Self {
            feature: feature.into(),
            weight,
            direction: Direction::HigherIsRiskier,
        }
    }

    /// Indicator where lower values are riskier
    pub fn lower(feature: impl Into<String>, weight: f64) -> Self {
        Self {
            feature: feature.into(),
            weight,
            direction: Direction::LowerIsRiskier,
        }
    }

    /// Default indicator set for the standard catalog
    pub fn standard() -> Vec<Self> {
        vec![
            Self::higher(AGE_DEPENDENCY_RATIO, 1.0),
            Self::higher(POVERTY_RATE, 1.0),
            Self::higher(HURRICANE_EXPOSURE, 0.5),
            Self::higher(EARTHQUAKE_EXPOSURE, 0.5),
        ]
    }
}

/// Method used to bring a raw component onto [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `(x - min) / (max - min)`
    #[default]
    MinMax,
    /// Average rank scaled to `[0, 1]`
    Rank,
}

/// Scorer options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Indicators of the indicator component
    pub indicators: Vec<IndicatorSpec>,
    /// Normalization method for every component
    #[serde(default)]
    pub normalization: Normalization,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            indicators: IndicatorSpec::standard(),
            normalization: Normalization::MinMax,
        }
    }
}

impl ScorerConfig {
    /// Indicators must be non-empty with finite nonnegative weights and a positive total
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.indicators.is_empty() {
            return Err(ConfigurationError::invalid(
                "indicators",
                "at least one indicator is required",
            ));
        }
        for indicator in &self.indicators {
            if !indicator.weight.is_finite() || indicator.weight < 0.0 {
                return Err(ConfigurationError::InvalidWeight {
                    name: indicator.feature.clone(),
                    value: indicator.weight,
                });
            }
        }
        if self.total_indicator_weight() <= 0.0 {
            return Err(ConfigurationError::invalid(
                "indicators",
                "indicator weights sum to zero",
            ));
        }
        Ok(())
    }

    /// Every indicator must be a feature of `schema`
    pub fn validate_against(&self, schema: &FeatureSchema) -> Result<(), ConfigurationError> {
        self.validate()?;
        match self.indicators.iter().find(|i| !schema.contains(&i.feature)) {
            Some(missing) => Err(ConfigurationError::UnknownFeature(missing.feature.clone())),
            None => Ok(()),
        }
    }

    pub(crate) fn total_indicator_weight(&self) -> f64 {
        self.indicators.iter().map(|i| i.weight).sum()
    }
}
