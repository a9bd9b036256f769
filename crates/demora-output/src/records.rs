//! Flat CSV records for each stage output.

use crate::export::Tabular;
use demora_data::{Exclusion, ExclusionReason, Warning};
use demora_forecast::{ImportanceReport, VariantComparison};
use demora_risk::ScoreSheet;
use demora_typology::{ClusterAssignment, StabilityReport};
use serde::{Deserialize, Serialize};

/// One variant of a comparison; failed variants have no rank or scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    /// 1-based rank by mean RMSE
    pub rank: Option<usize>,
    /// Variant with hyperparameters
    pub variant: String,
    /// Model family
    pub family: String,
    /// Folds that were scored
    pub folds: usize,
    /// Mean held-out MAE
    pub mae_mean: Option<f64>,
    /// Standard deviation of held-out MAE
    pub mae_std: Option<f64>,
    /// Mean held-out RMSE
    pub rmse_mean: Option<f64>,
    /// Standard deviation of held-out RMSE
    pub rmse_std: Option<f64>,
    /// Failure reason
    pub error: Option<String>,
}

impl Tabular for VariantComparison {
    type Row = ComparisonRow;

    fn rows(&self) -> Vec<ComparisonRow> {
        let ranked = self.ranked.iter().map(|r| ComparisonRow {
            rank: Some(r.rank),
            variant: r.variant.to_string(),
            family: r.variant.family().to_string(),
            folds: r.result.folds.len(),
            mae_mean: Some(r.result.mae.mean),
            mae_std: Some(r.result.mae.std),
            rmse_mean: Some(r.result.rmse.mean),
            rmse_std: Some(r.result.rmse.std),
            error: None,
        });
        let failed = self.failures.iter().map(|f| ComparisonRow {
            rank: None,
            variant: f.variant.to_string(),
            family: f.variant.family().to_string(),
            folds: 0,
            mae_mean: None,
            mae_std: None,
            rmse_mean: None,
            rmse_std: None,
            error: Some(f.reason.clone()),
        });
        ranked.chain(failed).collect()
    }
}

/// Permutation importance of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceRow {
    /// 1-based rank by mean score drop
    pub rank: usize,
    /// Feature name
    pub feature: String,
    /// Mean score drop
    pub mean: f64,
    /// Standard deviation of the score drop
    pub std: f64,
}

impl Tabular for ImportanceReport {
    type Row = ImportanceRow;

    fn rows(&self) -> Vec<ImportanceRow> {
        self.ranked()
            .into_iter()
            .enumerate()
            .map(|(i, f)| ImportanceRow {
                rank: i + 1,
                feature: f.feature.clone(),
                mean: f.mean,
                std: f.std,
            })
            .collect()
    }
}

/// Cluster label of one municipality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRow {
    /// Municipality identifier
    pub municipality_id: String,
    /// Clustered period
    pub period: i32,
    /// Cluster label
    pub label: usize,
}

impl Tabular for ClusterAssignment {
    type Row = AssignmentRow;

    fn rows(&self) -> Vec<AssignmentRow> {
        self.labels
            .iter()
            .map(|(id, &label)| AssignmentRow {
                municipality_id: id.clone(),
                period: self.period,
                label,
            })
            .collect()
    }
}

/// Agreement of one perturbation with the reference clustering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityRow {
    /// Perturbation index
    pub index: usize,
    /// Perturbation description
    pub perturbation: String,
    /// Agreement with the reference
    pub agreement: f64,
}

impl Tabular for StabilityReport {
    type Row = StabilityRow;

    fn rows(&self) -> Vec<StabilityRow> {
        self.scores
            .iter()
            .map(|s| StabilityRow {
                index: s.index,
                perturbation: s.description.clone(),
                agreement: s.agreement,
            })
            .collect()
    }
}

/// Vulnerability of one municipality with its breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    /// 1-based rank, most vulnerable first
    pub rank: usize,
    /// Municipality identifier
    pub municipality_id: String,
    /// Scoring period
    pub period: i32,
    /// Composite score
    pub score: f64,
    /// Normalized forecast component
    pub forecast: f64,
    /// Normalized cluster component
    pub cluster: f64,
    /// Normalized indicator component
    pub indicator: f64,
    /// Weighted forecast contribution
    pub forecast_contribution: f64,
    /// Weighted cluster contribution
    pub cluster_contribution: f64,
    /// Weighted indicator contribution
    pub indicator_contribution: f64,
    /// Predicted percent change
    pub predicted_change: f64,
    /// Cluster label
    pub cluster_label: usize,
}

impl Tabular for ScoreSheet {
    type Row = ScoreRow;

    fn rows(&self) -> Vec<ScoreRow> {
        self.ranked()
            .into_iter()
            .enumerate()
            .map(|(i, s)| ScoreRow {
                rank: i + 1,
                municipality_id: s.municipality_id.clone(),
                period: s.period,
                score: s.score,
                forecast: s.components.forecast,
                cluster: s.components.cluster,
                indicator: s.components.indicator,
                forecast_contribution: s.contributions.forecast,
                cluster_contribution: s.contributions.cluster,
                indicator_contribution: s.contributions.indicator,
                predicted_change: s.predicted_change,
                cluster_label: s.cluster_label,
            })
            .collect()
    }
}

/// A dropped observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRow {
    /// Municipality identifier
    pub municipality_id: String,
    /// Period
    pub period: i32,
    /// Reason code
    pub reason: String,
    /// Lag involved, for lag exclusions
    pub lag: Option<usize>,
}

fn reason_code(reason: &ExclusionReason) -> (&'static str, Option<usize>) {
    match *reason {
        ExclusionReason::UnknownPeriod => ("unknown_period", None),
        ExclusionReason::MissingRow => ("missing_row", None),
        ExclusionReason::MissingPopulation => ("missing_population", None),
        ExclusionReason::NonPositivePopulation => ("non_positive_population", None),
        ExclusionReason::MissingTargetPeriod => ("missing_target_period", None),
        ExclusionReason::MissingTargetObservation => ("missing_target_observation", None),
        ExclusionReason::MissingLagPeriod { lag } => ("missing_lag_period", Some(lag)),
        ExclusionReason::MissingLagObservation { lag } => ("missing_lag_observation", Some(lag)),
    }
}

impl Tabular for [Exclusion] {
    type Row = ExclusionRow;

    fn rows(&self) -> Vec<ExclusionRow> {
        self.iter()
            .map(|e| {
                let (reason, lag) = reason_code(&e.reason);
                ExclusionRow {
                    municipality_id: e.key.municipality_id.clone(),
                    period: e.key.period,
                    reason: reason.to_string(),
                    lag,
                }
            })
            .collect()
    }
}

/// A diagnostic attached to some stage output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRow {
    /// Warning kind
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

const fn warning_kind(warning: &Warning) -> &'static str {
    match warning {
        Warning::ZeroVarianceFeature { .. } => "zero_variance_feature",
        Warning::SkippedFold { .. } => "skipped_fold",
        Warning::SkippedResample { .. } => "skipped_resample",
        Warning::UnstableClustering { .. } => "unstable_clustering",
        Warning::DegenerateComponent { .. } => "degenerate_component",
        Warning::ClusterRiskFromPredictions { .. } => "cluster_risk_from_predictions",
    }
}

impl Tabular for [Warning] {
    type Row = WarningRow;

    fn rows(&self) -> Vec<WarningRow> {
        self.iter()
            .map(|w| WarningRow {
                kind: warning_kind(w).to_string(),
                message: w.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ExportFormat, Exporter};
    use demora_data::{ObservationKey, Summary, Warning};
    use demora_forecast::{
        CvResult, FeatureImportance, ModelVariant, RankedVariant, SplitStrategy, VariantFailure,
    };
    use demora_typology::{
        AgreementMetric, ClusterAlgorithm, Perturbation, PerturbationScore,
    };
    use ndarray::Array2;
    use std::collections::BTreeMap;

    fn cv(rmse: f64) -> CvResult {
        CvResult {
            strategy: SplitStrategy::RandomKFold,
            requested_folds: 3,
            folds: Vec::new(),
            mae: Summary {
                mean: rmse * 0.8,
                std: 0.1,
            },
            rmse: Summary {
                mean: rmse,
                std: 0.2,
            },
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_comparison_rows_include_failures() {
        let comparison = VariantComparison {
            ranked: vec![
                RankedVariant {
                    rank: 1,
                    variant: ModelVariant::Ridge { alpha: 1.0 },
                    result: cv(1.5),
                },
                RankedVariant {
                    rank: 2,
                    variant: ModelVariant::MeanBaseline,
                    result: cv(3.0),
                },
            ],
            failures: vec![VariantFailure {
                variant: ModelVariant::Linear,
                reason: "singular system".to_string(),
            }],
        };
        let rows = comparison.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].rank, Some(1));
        assert_eq!(rows[0].family, "ridge");
        assert_eq!(rows[2].rank, None);
        assert_eq!(rows[2].error.as_deref(), Some("singular system"));

        let csv = comparison.export_to_string(ExportFormat::Csv).unwrap();
        assert!(csv.starts_with("rank,variant,family,folds,"));
        assert!(csv.contains("singular system"));
    }

    #[test]
    fn test_importance_rows_are_ranked() {
        let report = ImportanceReport {
            baseline_score: -1.0,
            repetitions: 2,
            features: vec![
                FeatureImportance {
                    feature: "median_age".to_string(),
                    mean: 0.1,
                    std: 0.01,
                    drops: vec![0.09, 0.11],
                },
                FeatureImportance {
                    feature: "fertility_rate".to_string(),
                    mean: 0.9,
                    std: 0.05,
                    drops: vec![0.85, 0.95],
                },
            ],
        };
        let rows = report.rows();
        assert_eq!(rows[0].feature, "fertility_rate");
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[1].rank, 2);
    }

    #[test]
    fn test_assignment_and_stability_rows() {
        let labels: BTreeMap<String, usize> =
            [("M001".to_string(), 0), ("M000".to_string(), 1)].into();
        let assignment = ClusterAssignment {
            k: 2,
            algorithm: ClusterAlgorithm::default(),
            features: vec!["median_age".to_string()],
            period: 2014,
            labels,
            centroids: Array2::zeros((2, 1)),
            inertia: 0.0,
            sizes: vec![1, 1],
            warnings: Vec::new(),
        };
        let rows = assignment.rows();
        assert_eq!(rows[0].municipality_id, "M000");
        assert_eq!(rows[0].label, 1);
        assert!(rows.iter().all(|r| r.period == 2014));

        let report = StabilityReport {
            k: 2,
            algorithm: ClusterAlgorithm::default(),
            perturbation: Perturbation::Bootstrap,
            metric: AgreementMetric::AdjustedRand,
            unstable_threshold: 0.6,
            scores: vec![PerturbationScore {
                index: 0,
                description: "bootstrap 0".to_string(),
                agreement: 0.4,
            }],
            mean: Some(0.4),
            std: Some(0.0),
            warnings: vec![Warning::UnstableClustering {
                mean_agreement: 0.4,
                threshold: 0.6,
            }],
        };
        let csv = report.export_to_string(ExportFormat::Csv).unwrap();
        assert_eq!(
            csv.lines().collect::<Vec<_>>(),
            vec!["index,perturbation,agreement", "0,bootstrap 0,0.4"]
        );
        let json = report.export_to_string(ExportFormat::Json).unwrap();
        assert!(json.contains("unstable_clustering"));
    }

    #[test]
    fn test_exclusion_rows() {
        let exclusions = vec![
            Exclusion {
                key: ObservationKey::new("M003", 2010),
                reason: ExclusionReason::MissingLagPeriod { lag: 1 },
            },
            Exclusion {
                key: ObservationKey::new("M004", 2014),
                reason: ExclusionReason::MissingTargetPeriod,
            },
        ];
        let rows = exclusions.rows();
        assert_eq!(rows[0].reason, "missing_lag_period");
        assert_eq!(rows[0].lag, Some(1));
        assert_eq!(rows[1].lag, None);

        let csv = exclusions.as_slice().export_to_string(ExportFormat::Csv).unwrap();
        assert!(csv.contains("M004,2014,missing_target_period,"));
    }

    #[test]
    fn test_warning_rows() {
        let warnings = vec![Warning::DegenerateComponent {
            component: "forecast".to_string(),
        }];
        let rows = warnings.rows();
        assert_eq!(rows[0].kind, "degenerate_component");
        assert_eq!(rows[0].message, "component 'forecast' is constant across the cohort");
    }
}
