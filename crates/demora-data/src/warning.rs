//! Non-fatal diagnostics.
//!
//! Degenerate data never aborts a run. Each stage attaches the relevant
//! warnings to its output object and downstream consumers decide how to react.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A diagnostic attached to a stage output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A feature has the same value in every row
    ZeroVarianceFeature {
        /// Feature name
        feature: String,
    },
    /// A cross-validation fold could not be scored
    SkippedFold {
        /// Fold index
        fold: usize,
        /// Why the fold was skipped
        reason: String,
    },
    /// A stability perturbation could not be clustered
    SkippedResample {
        /// Resample index
        resample: usize,
        /// Why the resample was skipped
        reason: String,
    },
    /// Mean agreement across perturbations fell below the threshold
    UnstableClustering {
        /// Observed mean agreement
        mean_agreement: f64,
        /// Configured threshold
        threshold: f64,
    },
    /// A scoring component had no spread across the cohort
    DegenerateComponent {
        /// Component name
        component: String,
    },
    /// A cluster had no history, so its risk comes from predictions
    ClusterRiskFromPredictions {
        /// Cluster label
        label: usize,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroVarianceFeature { feature } => {
                write!(f, "feature '{feature}' has zero variance")
            }
            Self::SkippedFold { fold, reason } => write!(f, "fold {fold} skipped: {reason}"),
            Self::SkippedResample { resample, reason } => {
                write!(f, "resample {resample} skipped: {reason}")
            }
            Self::UnstableClustering {
                mean_agreement,
                threshold,
            } => write!(
                f,
                "unstable clustering: mean agreement {mean_agreement:.3} below {threshold:.3}"
            ),
            Self::DegenerateComponent { component } => {
                write!(f, "component '{component}' is constant across the cohort")
            }
            Self::ClusterRiskFromPredictions { label } => {
                write!(f, "cluster {label} has no history; risk uses predictions")
            }
        }
    }
}
