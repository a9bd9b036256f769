//! Cluster algorithms and assignments.

use demora_data::{ConfigurationError, Warning};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Linkage criterion for hierarchical clustering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Minimum increase in within-cluster variance
    #[default]
    Ward,
    /// Mean pairwise distance
    Average,
    /// Maximum pairwise distance
    Complete,
}

/// Clustering algorithm with its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClusterAlgorithm {
    /// k-means++ seeded Lloyd iterations
    KMeans {
        /// Independent restarts; the lowest inertia wins
        restarts: usize,
        /// Lloyd iteration limit per restart
        max_iterations: usize,
    },
    /// Agglomerative clustering
    Hierarchical {
        /// Linkage criterion
        linkage: Linkage,
    },
}

impl Default for ClusterAlgorithm {
    fn default() -> Self {
        Self::KMeans {
            restarts: 10,
            max_iterations: 300,
        }
    }
}

impl ClusterAlgorithm {
    /// Check the algorithm parameters
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match *self {
            Self::KMeans {
                restarts,
                max_iterations,
            } => {
                if restarts == 0 {
                    return Err(ConfigurationError::invalid("restarts", "must be >= 1"));
                }
                if max_iterations == 0 {
                    return Err(ConfigurationError::invalid("max_iterations", "must be >= 1"));
                }
                Ok(())
            }
            Self::Hierarchical { .. } => Ok(()),
        }
    }
}

impl fmt::Display for ClusterAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KMeans { restarts, .. } => write!(f, "k_means(restarts={restarts})"),
            Self::Hierarchical { linkage } => write!(f, "hierarchical({linkage:?})"),
        }
    }
}

/// Municipality to cluster label for one clustering run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    /// Number of clusters
    pub k: usize,
    /// Algorithm used
    pub algorithm: ClusterAlgorithm,
    /// Clustering features, in centroid column order
    pub features: Vec<String>,
    /// Period of the clustered rows
    pub period: i32,
    /// Label per municipality; labels are numbered by first appearance in id order
    pub labels: BTreeMap<String, usize>,
    /// Centroids in standardized units (k x features)
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares in standardized units
    pub inertia: f64,
    /// Members per label
    pub sizes: Vec<usize>,
    /// Degenerate-data diagnostics
    pub warnings: Vec<Warning>,
}

impl ClusterAssignment {
    /// Label of a municipality
    pub fn label_of(&self, municipality_id: &str) -> Option<usize> {
        self.labels.get(municipality_id).copied()
    }

    /// Municipalities carrying `label`, in id order
    pub fn members(&self, label: usize) -> Vec<&str> {
        self.labels
            .iter()
            .filter(|(_, l)| **l == label)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Renumber labels by first appearance
pub(crate) fn canonical_labels(raw: &[usize]) -> Vec<usize> {
    let mut mapping: BTreeMap<usize, usize> = BTreeMap::new();
    raw.iter()
        .map(|label| {
            let next = mapping.len();
            *mapping.entry(*label).or_insert(next)
        })
        .collect()
}
