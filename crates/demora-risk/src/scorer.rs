//! Composite vulnerability scoring
//!
//! Each municipality of the scoring period receives three components on
//! `[0, 1]`:
//!
//! - **forecast**: predicted decline (`-predicted change`), normalized across
//!   the cohort
//! - **cluster**: the rank of its cluster's mean historical change, most
//!   declining cluster highest, scaled to `[0, 1]`
//! - **indicator**: the weighted mean of the configured indicators, each
//!   oriented so higher is riskier and normalized across the cohort
//!
//! The composite is the weighted sum of the components.

use crate::config::{Direction, Normalization, ScorerConfig, ScoringWeights};
use crate::error::ScoringError;
use demora_data::{ConfigurationError, FeatureMatrix, Warning};
use demora_forecast::FittedModel;
use demora_typology::ClusterAssignment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Normalized component values, or weighted contributions, of one score
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreComponents {
    /// Forecast component
    pub forecast: f64,
    /// Cluster component
    pub cluster: f64,
    /// Indicator component
    pub indicator: f64,
}

impl ScoreComponents {
    /// Sum of the three parts
    pub fn total(&self) -> f64 {
        self.forecast + self.cluster + self.indicator
    }

    fn weighted(&self, weights: &ScoringWeights) -> Self {
        Self {
            forecast: self.forecast * weights.forecast,
            cluster: self.cluster * weights.cluster,
            indicator: self.indicator * weights.indicator,
        }
    }
}

/// Vulnerability of one municipality in one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityScore {
    /// Municipality identifier
    pub municipality_id: String,
    /// Scoring period
    pub period: i32,
    /// Composite score in [0, 1]
    pub score: f64,
    /// Normalized components
    pub components: ScoreComponents,
    /// Components multiplied by their weights; these sum to `score`
    pub contributions: ScoreComponents,
    /// Model prediction of the percent population change
    pub predicted_change: f64,
    /// Cluster label of the municipality
    pub cluster_label: usize,
}

/// Where a cluster's mean change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSource {
    /// Observed targets up to the scoring period
    History,
    /// Predictions for the cohort, used when no history exists
    Predictions,
}

/// Risk ranking of one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRisk {
    /// Cluster label
    pub label: usize,
    /// Mean percent change of the cluster
    pub mean_change: f64,
    /// Source of `mean_change`
    pub source: RiskSource,
    /// Rows averaged into `mean_change`
    pub rows: usize,
    /// Scaled decline rank in [0, 1]; the cluster component of its members
    pub risk: f64,
}

/// Scores of one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSheet {
    /// Scoring period
    pub period: i32,
    /// Weights used
    pub weights: ScoringWeights,
    /// Normalization used for the forecast and indicator components
    pub normalization: Normalization,
    /// Score per municipality
    pub scores: BTreeMap<String, VulnerabilityScore>,
    /// Risk ranking per cluster, by label
    pub cluster_risk: Vec<ClusterRisk>,
    /// Degenerate-component and fallback diagnostics
    pub warnings: Vec<Warning>,
}

impl ScoreSheet {
    /// Score of one municipality
    pub fn get(&self, municipality_id: &str) -> Option<&VulnerabilityScore> {
        self.scores.get(municipality_id)
    }

    /// Scores from most to least vulnerable; ties keep id order
    pub fn ranked(&self) -> Vec<&VulnerabilityScore> {
        let mut ranked: Vec<_> = self.scores.values().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }

    /// Number of scored municipalities
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether no municipality was scored
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Fuses forecasts, typology, and raw indicators into vulnerability scores
#[derive(Debug, Clone, Default)]
pub struct VulnerabilityScorer {
    config: ScorerConfig,
}

impl VulnerabilityScorer {
    /// Create a scorer
    pub const fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Scorer options
    pub const fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score every municipality observed in `period`
    ///
    /// # Arguments
    /// * `period` - Scoring period; its rows form the cohort
    /// * `matrix` - Cohort rows plus history rows; rows with a period up to
    ///   `period` and a known target feed the cluster component
    /// * `fitted` - Model predicting the cohort's change
    /// * `clusters` - Labels for every cohort municipality
    /// * `weights` - Component weights
    ///
    /// # Errors
    /// Weights and indicators are validated before any computation.
    pub fn score(
        &self,
        period: i32,
        matrix: &FeatureMatrix,
        fitted: &FittedModel,
        clusters: &ClusterAssignment,
        weights: &ScoringWeights,
    ) -> Result<ScoreSheet, ScoringError> {
        weights.validate()?;
        self.config.validate_against(matrix.schema())?;

        let rows: Vec<usize> = matrix
            .keys()
            .iter()
            .enumerate()
            .filter(|(_, key)| key.period == period)
            .map(|(i, _)| i)
            .collect();
        if rows.is_empty() {
            return Err(ScoringError::EmptyPeriod(period));
        }
        let cohort = matrix.select_rows(&rows)?;
        let ids: Vec<&str> = cohort
            .keys()
            .iter()
            .map(|k| k.municipality_id.as_str())
            .collect();
        let labels = ids
            .iter()
            .map(|id| {
                clusters
                    .label_of(id)
                    .ok_or_else(|| ScoringError::MissingLabel((*id).to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut warnings = Vec::new();
        let indicator = self.indicator_component(&cohort, &ids, &mut warnings)?;

        let predictions = fitted.predict(&cohort)?.to_vec();
        let decline: Vec<f64> = predictions.iter().map(|p| -p).collect();
        let forecast = normalize_or_zero(self.config.normalization, &decline, "forecast", &mut warnings);

        let cluster_risk = cluster_risk(period, matrix, clusters, &labels, &predictions, &mut warnings);
        let risk_by_label: BTreeMap<usize, f64> =
            cluster_risk.iter().map(|c| (c.label, c.risk)).collect();

        let mut scores = BTreeMap::new();
        for (i, id) in ids.iter().enumerate() {
            let components = ScoreComponents {
                forecast: forecast[i],
                cluster: risk_by_label.get(&labels[i]).copied().unwrap_or(0.0),
                indicator: indicator[i],
            };
            let contributions = components.weighted(weights);
            scores.insert(
                (*id).to_string(),
                VulnerabilityScore {
                    municipality_id: (*id).to_string(),
                    period,
                    score: contributions.total().clamp(0.0, 1.0),
                    components,
                    contributions,
                    predicted_change: predictions[i],
                    cluster_label: labels[i],
                },
            );
        }

        for warning in &warnings {
            warn!(%warning, period, "scoring diagnostic");
        }
        info!(
            period,
            municipalities = scores.len(),
            clusters = cluster_risk.len(),
            warnings = warnings.len(),
            "scored vulnerability"
        );

        Ok(ScoreSheet {
            period,
            weights: *weights,
            normalization: self.config.normalization,
            scores,
            cluster_risk,
            warnings,
        })
    }

    /// Weighted mean of the oriented, normalized indicators
    fn indicator_component(
        &self,
        cohort: &FeatureMatrix,
        ids: &[&str],
        warnings: &mut Vec<Warning>,
    ) -> Result<Vec<f64>, ScoringError> {
        let total_weight = self.config.total_indicator_weight();
        let mut combined = vec![0.0; cohort.nrows()];
        for spec in &self.config.indicators {
            let column = cohort
                .column(&spec.feature)
                .ok_or_else(|| ConfigurationError::UnknownFeature(spec.feature.clone()))?;
            if let Some(i) = column.iter().position(|v| v.is_nan()) {
                return Err(ScoringError::MissingIndicator {
                    feature: spec.feature.clone(),
                    municipality_id: ids[i].to_string(),
                });
            }
            let oriented: Vec<f64> = match spec.direction {
                Direction::HigherIsRiskier => column.to_vec(),
                Direction::LowerIsRiskier => column.iter().map(|v| -v).collect(),
            };
            let component = format!("indicator:{}", spec.feature);
            let normalized =
                normalize_or_zero(self.config.normalization, &oriented, &component, warnings);
            let share = spec.weight / total_weight;
            for (acc, value) in combined.iter_mut().zip(normalized) {
                *acc += share * value;
            }
        }
        Ok(combined)
    }
}

fn normalize_or_zero(
    method: Normalization,
    values: &[f64],
    component: &str,
    warnings: &mut Vec<Warning>,
) -> Vec<f64> {
    method.apply(values).unwrap_or_else(|| {
        warnings.push(Warning::DegenerateComponent {
            component: component.to_string(),
        });
        vec![0.0; values.len()]
    })
}

/// Mean change per cluster and its scaled decline rank
fn cluster_risk(
    period: i32,
    matrix: &FeatureMatrix,
    clusters: &ClusterAssignment,
    cohort_labels: &[usize],
    predictions: &[f64],
    warnings: &mut Vec<Warning>,
) -> Vec<ClusterRisk> {
    let mut history: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
    if let Some(target) = matrix.target() {
        for (key, &value) in matrix.keys().iter().zip(target) {
            if key.period > period || value.is_nan() {
                continue;
            }
            if let Some(label) = clusters.label_of(&key.municipality_id) {
                let entry = history.entry(label).or_default();
                entry.0 += value;
                entry.1 += 1;
            }
        }
    }

    let mut risks = Vec::new();
    for label in 0..clusters.k {
        if let Some(&(sum, rows)) = history.get(&label) {
            risks.push(ClusterRisk {
                label,
                mean_change: sum / rows as f64,
                source: RiskSource::History,
                rows,
                risk: 0.0,
            });
            continue;
        }
        let members: Vec<f64> = cohort_labels
            .iter()
            .zip(predictions)
            .filter(|(l, _)| **l == label)
            .map(|(_, p)| *p)
            .collect();
        if members.is_empty() {
            continue;
        }
        warnings.push(Warning::ClusterRiskFromPredictions { label });
        risks.push(ClusterRisk {
            label,
            mean_change: members.iter().sum::<f64>() / members.len() as f64,
            source: RiskSource::Predictions,
            rows: members.len(),
            risk: 0.0,
        });
    }

    let decline: Vec<f64> = risks.iter().map(|c| -c.mean_change).collect();
    let ranks = normalize_or_zero(Normalization::Rank, &decline, "cluster", warnings);
    for (risk, rank) in risks.iter_mut().zip(ranks) {
        risk.risk = rank;
        debug!(
            label = risk.label,
            mean_change = risk.mean_change,
            risk = risk.risk,
            "ranked cluster"
        );
    }
    risks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndicatorSpec;
    use approx::assert_abs_diff_eq;
    use demora_data::{FeatureSchema, ObservationKey};
    use demora_forecast::{ForecastingEngine, ModelVariant};
    use demora_typology::ClusterAlgorithm;
    use ndarray::{Array1, Array2};

    /// Four municipalities over two periods; `x` drives the target, `hazard` is an indicator
    fn panel() -> FeatureMatrix {
        let mut keys = Vec::new();
        let mut features = Vec::new();
        let mut target = Vec::new();
        for (period, shift) in [(2010, 0.0), (2011, 0.5)] {
            for (m, (x, hazard)) in [(1.0, 0.1), (2.0, 0.4), (3.0, 0.2), (4.0, 0.9)]
                .into_iter()
                .enumerate()
            {
                keys.push(ObservationKey::new(format!("M{m}"), period));
                features.extend([x + shift, hazard]);
                target.push(-2.0 * (x + shift));
            }
        }
        FeatureMatrix::new(
            FeatureSchema::unbounded(&["x", "hazard"]),
            keys,
            Array2::from_shape_vec((8, 2), features).unwrap(),
            Some(Array1::from(target)),
        )
        .unwrap()
    }

    fn assignment(labels: &[(&str, usize)]) -> ClusterAssignment {
        let k = labels.iter().map(|(_, l)| l + 1).max().unwrap_or(0);
        let mut sizes = vec![0; k];
        for (_, l) in labels {
            sizes[*l] += 1;
        }
        ClusterAssignment {
            k,
            algorithm: ClusterAlgorithm::default(),
            features: vec!["x".to_string()],
            period: 2011,
            labels: labels.iter().map(|(id, l)| (id.to_string(), *l)).collect(),
            centroids: Array2::zeros((k, 1)),
            inertia: 0.0,
            sizes,
            warnings: Vec::new(),
        }
    }

    fn scorer() -> VulnerabilityScorer {
        VulnerabilityScorer::new(ScorerConfig {
            indicators: vec![IndicatorSpec::higher("hazard", 1.0)],
            normalization: Normalization::MinMax,
        })
    }

    fn fitted(matrix: &FeatureMatrix) -> FittedModel {
        ForecastingEngine::new(7)
            .fit(matrix, &ModelVariant::Linear)
            .unwrap()
    }

    #[test]
    fn test_components_and_contributions() {
        let matrix = panel();
        let model = fitted(&matrix);
        let clusters = assignment(&[("M0", 0), ("M1", 0), ("M2", 1), ("M3", 1)]);
        let weights = ScoringWeights::new(0.5, 0.25, 0.25);
        let sheet = scorer()
            .score(2011, &matrix, &model, &clusters, &weights)
            .unwrap();

        assert_eq!(sheet.len(), 4);
        assert!(sheet.warnings.is_empty());

        // Largest x declines most
        let m3 = sheet.get("M3").unwrap();
        assert_abs_diff_eq!(m3.components.forecast, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m3.components.cluster, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m3.components.indicator, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m3.score, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m3.predicted_change, -9.0, epsilon = 1e-9);

        let m0 = sheet.get("M0").unwrap();
        assert_abs_diff_eq!(m0.score, 0.0, epsilon = 1e-9);

        for score in sheet.scores.values() {
            assert_abs_diff_eq!(score.contributions.total(), score.score, epsilon = 1e-12);
            assert!((0.0..=1.0).contains(&score.score));
        }
        assert_eq!(sheet.ranked()[0].municipality_id, "M3");
        assert_eq!(sheet.cluster_risk.len(), 2);
        assert!(sheet.cluster_risk.iter().all(|c| c.source == RiskSource::History));
    }

    #[test]
    fn test_invalid_weights_rejected_first() {
        let matrix = panel();
        let model = fitted(&matrix);
        let clusters = assignment(&[("M0", 0)]);
        let result = scorer().score(
            2011,
            &matrix,
            &model,
            &clusters,
            &ScoringWeights::new(0.5, 0.5, 0.2),
        );
        assert!(matches!(
            result,
            Err(ScoringError::Configuration(
                ConfigurationError::WeightsDoNotSumToOne { .. }
            ))
        ));
    }

    #[test]
    fn test_missing_label() {
        let matrix = panel();
        let model = fitted(&matrix);
        let clusters = assignment(&[("M0", 0), ("M1", 0), ("M2", 1)]);
        let result = scorer().score(2011, &matrix, &model, &clusters, &ScoringWeights::default());
        assert!(matches!(result, Err(ScoringError::MissingLabel(id)) if id == "M3"));
    }

    #[test]
    fn test_empty_period() {
        let matrix = panel();
        let model = fitted(&matrix);
        let clusters = assignment(&[("M0", 0), ("M1", 1)]);
        let result = scorer().score(2020, &matrix, &model, &clusters, &ScoringWeights::default());
        assert!(matches!(result, Err(ScoringError::EmptyPeriod(2020))));
    }

    #[test]
    fn test_cluster_fallback_to_predictions() {
        let matrix = panel();
        let model = fitted(&matrix);
        let scoring = matrix.without_target();
        let clusters = assignment(&[("M0", 0), ("M1", 0), ("M2", 1), ("M3", 1)]);
        let sheet = scorer()
            .score(2011, &scoring, &model, &clusters, &ScoringWeights::default())
            .unwrap();
        assert!(
            sheet
                .cluster_risk
                .iter()
                .all(|c| c.source == RiskSource::Predictions)
        );
        assert_eq!(
            sheet
                .warnings
                .iter()
                .filter(|w| matches!(w, Warning::ClusterRiskFromPredictions { .. }))
                .count(),
            2
        );
        assert_abs_diff_eq!(sheet.get("M3").unwrap().components.cluster, 1.0);
    }

    #[test]
    fn test_constant_indicator_is_degenerate() {
        let matrix = panel();
        let constant = Array1::from_elem(matrix.nrows(), 0.3);
        let matrix = matrix.with_feature_column(1, &constant).unwrap();
        let model = fitted(&matrix);
        let clusters = assignment(&[("M0", 0), ("M1", 0), ("M2", 1), ("M3", 1)]);
        let sheet = scorer()
            .score(2011, &matrix, &model, &clusters, &ScoringWeights::default())
            .unwrap();
        assert!(sheet.warnings.contains(&Warning::DegenerateComponent {
            component: "indicator:hazard".to_string()
        }));
        assert!(sheet.scores.values().all(|s| s.components.indicator == 0.0));
    }

    #[test]
    fn test_lower_is_riskier() {
        let matrix = panel();
        let model = fitted(&matrix);
        let clusters = assignment(&[("M0", 0), ("M1", 0), ("M2", 1), ("M3", 1)]);
        let scorer = VulnerabilityScorer::new(ScorerConfig {
            indicators: vec![IndicatorSpec::lower("hazard", 1.0)],
            normalization: Normalization::Rank,
        });
        let sheet = scorer
            .score(2011, &matrix, &model, &clusters, &ScoringWeights::default())
            .unwrap();
        assert_abs_diff_eq!(sheet.get("M0").unwrap().components.indicator, 1.0);
        assert_abs_diff_eq!(sheet.get("M3").unwrap().components.indicator, 0.0);
    }

    #[test]
    fn test_deterministic() {
        let matrix = panel();
        let model = fitted(&matrix);
        let clusters = assignment(&[("M0", 0), ("M1", 1), ("M2", 1), ("M3", 2)]);
        let a = scorer()
            .score(2011, &matrix, &model, &clusters, &ScoringWeights::default())
            .unwrap();
        let b = scorer()
            .score(2011, &matrix, &model, &clusters, &ScoringWeights::default())
            .unwrap();
        assert_eq!(a, b);
    }
}
