#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/demora-analytics/demora/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod agreement;
pub mod assignment;
pub mod engine;
pub mod error;
pub mod hierarchical;
pub mod kmeans;
pub mod stability;
pub mod standardize;

// Re-export main types
pub use agreement::AgreementMetric;
pub use assignment::{ClusterAlgorithm, ClusterAssignment, Linkage};
pub use engine::TypologyEngine;
pub use error::TypologyError;
pub use stability::{Perturbation, PerturbationScore, StabilityConfig, StabilityReport};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
