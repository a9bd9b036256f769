#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/demora-analytics/demora/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod normalize;
pub mod scorer;

// Re-export main types
pub use config::{Direction, IndicatorSpec, Normalization, ScorerConfig, ScoringWeights};
pub use error::ScoringError;
pub use scorer::{
    ClusterRisk, RiskSource, ScoreComponents, ScoreSheet, VulnerabilityScore, VulnerabilityScorer,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
