//! Stability diagnostics
//!
//! A clustering is re-run under perturbation and each perturbed partition is
//! compared with the reference partition. Low agreement is reported as a
//! warning; it never blocks downstream stages.

use crate::agreement::AgreementMetric;
use crate::assignment::ClusterAlgorithm;
use demora_data::{ConfigurationError, Warning};
use serde::{Deserialize, Serialize};

/// How the reference clustering is perturbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perturbation {
    /// Resample municipalities with replacement
    #[default]
    Bootstrap,
    /// Re-cluster at `k - 1` and `k + 1`
    AlternateK,
}

/// Options for [`crate::TypologyEngine::assess_stability`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Perturbation scheme
    pub perturbation: Perturbation,
    /// Agreement metric
    pub metric: AgreementMetric,
    /// Mean agreement below this attaches an `UnstableClustering` warning
    pub unstable_threshold: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            perturbation: Perturbation::Bootstrap,
            metric: AgreementMetric::AdjustedRand,
            unstable_threshold: 0.6,
        }
    }
}

impl StabilityConfig {
    /// The threshold must lie in [-1, 1]
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if (-1.0..=1.0).contains(&self.unstable_threshold) {
            Ok(())
        } else {
            Err(ConfigurationError::invalid(
                "unstable_threshold",
                format!("must be in [-1, 1], got {}", self.unstable_threshold),
            ))
        }
    }
}

/// Agreement of one perturbed partition with the reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerturbationScore {
    /// Perturbation index
    pub index: usize,
    /// Human-readable description (`bootstrap 3`, `k = 4`)
    pub description: String,
    /// Agreement with the reference partition
    pub agreement: f64,
}

/// Outcome of a stability assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    /// Reference cluster count
    pub k: usize,
    /// Algorithm used
    pub algorithm: ClusterAlgorithm,
    /// Perturbation scheme
    pub perturbation: Perturbation,
    /// Agreement metric
    pub metric: AgreementMetric,
    /// Threshold used for the unstable warning
    pub unstable_threshold: f64,
    /// Scored perturbations, by index
    pub scores: Vec<PerturbationScore>,
    /// Mean agreement (`None` when nothing could be scored)
    pub mean: Option<f64>,
    /// Population standard deviation of agreement
    pub std: Option<f64>,
    /// Skipped perturbations and instability diagnostics
    pub warnings: Vec<Warning>,
}

impl StabilityReport {
    /// Whether an `UnstableClustering` warning is attached
    pub fn is_unstable(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, Warning::UnstableClustering { .. }))
    }
}
