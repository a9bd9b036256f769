//! Typology engine
//!
//! Clusters the municipalities of one period on a feature subset and
//! assesses how stable that clustering is.

use crate::assignment::{ClusterAlgorithm, ClusterAssignment, canonical_labels};
use crate::error::TypologyError;
use crate::hierarchical::agglomerate;
use crate::kmeans::{centroids_and_inertia, kmeans};
use crate::stability::{Perturbation, PerturbationScore, StabilityConfig, StabilityReport};
use crate::standardize::standardize;
use demora_data::{ConfigurationError, FeatureMatrix, SeedSequence, Summary, Warning};
use ndarray::{Array2, ArrayView2, Axis};
use rand::Rng;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Standardized clustering input in canonical (municipality id) order
struct Prepared {
    ids: Vec<String>,
    data: Array2<f64>,
    features: Vec<String>,
    period: i32,
    warnings: Vec<Warning>,
}

/// Clusters municipalities and measures clustering stability
#[derive(Debug, Clone, Copy)]
pub struct TypologyEngine {
    seeds: SeedSequence,
    stability: StabilityConfig,
}

impl TypologyEngine {
    /// Create an engine whose random streams derive from `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            seeds: SeedSequence::new(seed),
            stability: StabilityConfig::default(),
        }
    }

    /// Replace the stability options
    pub const fn with_stability(mut self, stability: StabilityConfig) -> Self {
        self.stability = stability;
        self
    }

    /// Stability options
    pub const fn stability(&self) -> &StabilityConfig {
        &self.stability
    }

    /// Cluster the rows of `matrix` on `features` into `k` groups
    ///
    /// # Arguments
    /// * `matrix` - One row per municipality (a single period)
    /// * `features` - Clustering features; z-scored before distances are computed
    /// * `k` - Number of clusters, `2 <= k <= rows`
    /// * `algorithm` - k-means or hierarchical
    ///
    /// # Errors
    /// * `Configuration` for `k < 2`, an empty or unknown feature, or invalid
    ///   algorithm parameters
    /// * `MultiplePeriods`, `MissingValues`, or `TooFewRows` for unusable input
    pub fn cluster<S: AsRef<str>>(
        &self,
        matrix: &FeatureMatrix,
        features: &[S],
        k: usize,
        algorithm: &ClusterAlgorithm,
    ) -> Result<ClusterAssignment, TypologyError> {
        algorithm.validate()?;
        let prepared = prepare(matrix, features, k)?;
        let labels = run(
            prepared.data.view(),
            k,
            algorithm,
            &self.seeds.child("reference", 0),
        );
        let assignment = assemble(&prepared, k, algorithm, labels);
        info!(
            k,
            algorithm = %algorithm,
            period = prepared.period,
            municipalities = prepared.ids.len(),
            inertia = assignment.inertia,
            "clustered municipalities"
        );
        Ok(assignment)
    }

    /// Agreement between the reference clustering and perturbed re-runs
    ///
    /// `resamples` is the number of bootstrap draws; zero draws give a report
    /// with no scores. `alternate_k` ignores `resamples` and always runs its
    /// (at most two) perturbations.
    ///
    /// # Errors
    /// Everything [`Self::cluster`] rejects, or an invalid threshold.
    pub fn assess_stability<S: AsRef<str>>(
        &self,
        matrix: &FeatureMatrix,
        features: &[S],
        k: usize,
        algorithm: &ClusterAlgorithm,
        resamples: usize,
    ) -> Result<StabilityReport, TypologyError> {
        algorithm.validate()?;
        self.stability.validate()?;
        let prepared = prepare(matrix, features, k)?;
        let data = prepared.data.view();
        let reference = run(data, k, algorithm, &self.seeds.child("reference", 0));
        let metric = self.stability.metric;

        let outcomes: Vec<Result<PerturbationScore, Warning>> = match self.stability.perturbation
        {
            Perturbation::Bootstrap => (0..resamples)
                .into_par_iter()
                .map(|r| self.bootstrap(data, &reference, k, algorithm, r))
                .collect(),
            Perturbation::AlternateK => {
                let candidates: Vec<usize> =
                    [k.checked_sub(1), Some(k + 1)].into_iter().flatten().collect();
                candidates
                    .par_iter()
                    .enumerate()
                    .map(|(index, &alternate)| {
                        if alternate < 2 || alternate > data.nrows() {
                            return Err(Warning::SkippedResample {
                                resample: index,
                                reason: format!(
                                    "k = {alternate} is outside [2, {}]",
                                    data.nrows()
                                ),
                            });
                        }
                        let labels = run(
                            data,
                            alternate,
                            algorithm,
                            &self.seeds.child("alternate-k", alternate as u64),
                        );
                        Ok(PerturbationScore {
                            index,
                            description: format!("k = {alternate}"),
                            agreement: metric.score(&reference, &labels),
                        })
                    })
                    .collect()
            }
        };

        let mut scores = Vec::new();
        let mut warnings = prepared.warnings.clone();
        for outcome in outcomes {
            match outcome {
                Ok(score) => scores.push(score),
                Err(warning) => {
                    warn!(%warning, "stability perturbation skipped");
                    warnings.push(warning);
                }
            }
        }

        let agreements: Vec<f64> = scores.iter().map(|s| s.agreement).collect();
        let summary = Summary::from_values(&agreements);
        if let Some(summary) = summary {
            if summary.mean < self.stability.unstable_threshold {
                let warning = Warning::UnstableClustering {
                    mean_agreement: summary.mean,
                    threshold: self.stability.unstable_threshold,
                };
                warn!(%warning, "clustering is unstable");
                warnings.push(warning);
            }
        }

        info!(
            k,
            perturbation = ?self.stability.perturbation,
            scored = scores.len(),
            mean_agreement = summary.map(|s| s.mean),
            "assessed clustering stability"
        );

        Ok(StabilityReport {
            k,
            algorithm: *algorithm,
            perturbation: self.stability.perturbation,
            metric,
            unstable_threshold: self.stability.unstable_threshold,
            scores,
            mean: summary.map(|s| s.mean),
            std: summary.map(|s| s.std),
            warnings,
        })
    }

    /// Re-cluster one bootstrap draw and compare on the distinct municipalities drawn
    fn bootstrap(
        &self,
        data: ArrayView2<'_, f64>,
        reference: &[usize],
        k: usize,
        algorithm: &ClusterAlgorithm,
        resample: usize,
    ) -> Result<PerturbationScore, Warning> {
        let unit = self.seeds.child("bootstrap", resample as u64);
        let mut rng = unit.rng("draw", 0);
        let n = data.nrows();
        let drawn: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

        let distinct: BTreeSet<usize> = drawn.iter().copied().collect();
        if distinct.len() < k {
            return Err(Warning::SkippedResample {
                resample,
                reason: format!(
                    "{} distinct municipalities drawn for k = {k}",
                    distinct.len()
                ),
            });
        }

        let sample = data.select(Axis(0), &drawn);
        let labels = run(sample.view(), k, algorithm, &unit);

        let mut first_label: BTreeMap<usize, usize> = BTreeMap::new();
        for (position, &row) in drawn.iter().enumerate() {
            first_label.entry(row).or_insert(labels[position]);
        }
        let (expected, observed): (Vec<usize>, Vec<usize>) = first_label
            .iter()
            .map(|(&row, &label)| (reference[row], label))
            .unzip();

        let agreement = self.stability.metric.score(&expected, &observed);
        debug!(resample, agreement, "scored bootstrap resample");
        Ok(PerturbationScore {
            index: resample,
            description: format!("bootstrap {resample}"),
            agreement,
        })
    }
}

/// Validate the input and bring it into canonical order
fn prepare<S: AsRef<str>>(
    matrix: &FeatureMatrix,
    features: &[S],
    k: usize,
) -> Result<Prepared, TypologyError> {
    if k < 2 {
        return Err(ConfigurationError::InvalidClusterCount(k).into());
    }
    if features.is_empty() {
        return Err(ConfigurationError::invalid(
            "feature_subset_for_clustering",
            "at least one feature is required",
        )
        .into());
    }
    for feature in features {
        if !matrix.schema().contains(feature.as_ref()) {
            return Err(ConfigurationError::UnknownFeature(feature.as_ref().to_string()).into());
        }
    }
    let periods = matrix.periods();
    if periods.len() != 1 {
        return Err(TypologyError::MultiplePeriods(periods));
    }

    let subset = matrix.select_features(features)?;
    let names: Vec<String> = subset
        .feature_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    for (j, name) in names.iter().enumerate() {
        let count = subset.features().column(j).iter().filter(|v| v.is_nan()).count();
        if count > 0 {
            return Err(TypologyError::MissingValues {
                feature: name.clone(),
                count,
            });
        }
    }
    if k > subset.nrows() {
        return Err(TypologyError::TooFewRows {
            k,
            rows: subset.nrows(),
        });
    }

    let keys = subset.keys();
    let mut order: Vec<usize> = (0..subset.nrows()).collect();
    order.sort_by(|&a, &b| keys[a].municipality_id.cmp(&keys[b].municipality_id));
    let raw = subset.features().select(Axis(0), &order);
    let (data, warnings) = standardize(raw.view(), &names);

    Ok(Prepared {
        ids: order
            .iter()
            .map(|&i| keys[i].municipality_id.clone())
            .collect(),
        data,
        features: names,
        period: periods[0],
        warnings,
    })
}

/// Canonical labels of one clustering run
fn run(
    data: ArrayView2<'_, f64>,
    k: usize,
    algorithm: &ClusterAlgorithm,
    seeds: &SeedSequence,
) -> Vec<usize> {
    let raw = match *algorithm {
        ClusterAlgorithm::KMeans {
            restarts,
            max_iterations,
        } => kmeans(data, k, restarts, max_iterations, seeds).labels,
        ClusterAlgorithm::Hierarchical { linkage } => agglomerate(data, k, linkage),
    };
    canonical_labels(&raw)
}

fn assemble(
    prepared: &Prepared,
    k: usize,
    algorithm: &ClusterAlgorithm,
    labels: Vec<usize>,
) -> ClusterAssignment {
    let (centroids, inertia) = centroids_and_inertia(prepared.data.view(), &labels, k);
    let mut sizes = vec![0; k];
    for &label in &labels {
        sizes[label] += 1;
    }
    ClusterAssignment {
        k,
        algorithm: *algorithm,
        features: prepared.features.clone(),
        period: prepared.period,
        labels: prepared.ids.iter().cloned().zip(labels).collect(),
        centroids,
        inertia,
        sizes,
        warnings: prepared.warnings.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use demora_data::{FeatureSchema, ObservationKey};
    use ndarray::array;

    fn matrix(periods: &[i32], values: Array2<f64>) -> FeatureMatrix {
        let keys = periods
            .iter()
            .enumerate()
            .map(|(i, &p)| ObservationKey::new(format!("m{i}"), p))
            .collect();
        FeatureMatrix::new(FeatureSchema::unbounded(&["a", "b"]), keys, values, None).unwrap()
    }

    #[test]
    fn test_input_validation() {
        let engine = TypologyEngine::new(0);
        let algorithm = ClusterAlgorithm::default();
        let m = matrix(&[2020, 2020, 2020], array![[0.0, 1.0], [1.0, 2.0], [5.0, 5.0]]);

        assert!(matches!(
            engine.cluster(&m, &["a"], 1, &algorithm),
            Err(TypologyError::Configuration(
                ConfigurationError::InvalidClusterCount(1)
            ))
        ));
        assert!(matches!(
            engine.cluster(&m, &["a"], 4, &algorithm),
            Err(TypologyError::TooFewRows { k: 4, rows: 3 })
        ));
        assert!(matches!(
            engine.cluster(&m, &["zzz"], 2, &algorithm),
            Err(TypologyError::Configuration(ConfigurationError::UnknownFeature(_)))
        ));

        let two_periods = matrix(&[2020, 2021, 2021], array![[0.0, 1.0], [1.0, 2.0], [5.0, 5.0]]);
        assert!(matches!(
            engine.cluster(&two_periods, &["a"], 2, &algorithm),
            Err(TypologyError::MultiplePeriods(_))
        ));

        let missing = matrix(&[2020, 2020, 2020], array![[0.0, 1.0], [f64::NAN, 2.0], [5.0, 5.0]]);
        assert!(matches!(
            engine.cluster(&missing, &["a", "b"], 2, &algorithm),
            Err(TypologyError::MissingValues { count: 1, .. })
        ));
        // Missing values outside the subset are fine
        assert!(engine.cluster(&missing, &["b"], 2, &algorithm).is_ok());
    }

    #[test]
    fn test_zero_variance_feature_warns() {
        let m = matrix(
            &[2020, 2020, 2020, 2020],
            array![[0.0, 3.0], [0.1, 3.0], [9.0, 3.0], [9.1, 3.0]],
        );
        let assignment = TypologyEngine::new(0)
            .cluster(&m, &["a", "b"], 2, &ClusterAlgorithm::default())
            .unwrap();
        assert_eq!(
            assignment.warnings,
            vec![Warning::ZeroVarianceFeature {
                feature: "b".to_string()
            }]
        );
        assert_eq!(assignment.label_of("m0"), Some(0));
        assert_eq!(assignment.label_of("m1"), Some(0));
        assert_eq!(assignment.label_of("m2"), Some(1));
        assert_eq!(assignment.sizes, vec![2, 2]);
        assert_eq!(assignment.members(1), vec!["m2", "m3"]);
    }

    #[test]
    fn test_alternate_k_skips_invalid_counts() {
        let m = matrix(
            &[2020, 2020, 2020, 2020],
            array![[0.0, 0.0], [0.1, 0.0], [9.0, 1.0], [9.1, 1.0]],
        );
        let engine = TypologyEngine::new(0).with_stability(StabilityConfig {
            perturbation: Perturbation::AlternateK,
            ..Default::default()
        });
        let report = engine
            .assess_stability(&m, &["a", "b"], 2, &ClusterAlgorithm::default(), 0)
            .unwrap();
        // k - 1 = 1 is not a valid clustering; only k + 1 = 3 is scored
        assert_eq!(report.scores.len(), 1);
        assert_eq!(report.scores[0].description, "k = 3");
        assert!(
            report
                .warnings
                .iter()
                .any(|w| matches!(w, Warning::SkippedResample { resample: 0, .. }))
        );
    }

    #[test]
    fn test_zero_bootstrap_resamples() {
        let m = matrix(&[2020, 2020, 2020], array![[0.0, 1.0], [1.0, 2.0], [5.0, 5.0]]);
        let report = TypologyEngine::new(0)
            .assess_stability(&m, &["a"], 2, &ClusterAlgorithm::default(), 0)
            .unwrap();
        assert!(report.scores.is_empty());
        assert_eq!(report.mean, None);
        assert_eq!(report.std, None);
        assert!(!report.is_unstable());
    }
}
