#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/demora-analytics/demora/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod attribution;
pub mod cv;
pub mod engine;
pub mod error;
pub mod fitted;
pub mod learners;
pub mod linalg;
pub mod metrics;
pub mod variant;

// Re-export main types
pub use attribution::{AttributionEngine, FeatureImportance, ImportanceReport};
pub use cv::{CrossValidationHarness, CvResult, FoldPlan, FoldScore, SplitStrategy};
pub use engine::{ForecastingEngine, RankedVariant, VariantComparison, VariantFailure};
pub use error::ModelFitError;
pub use fitted::{FittedModel, ModelParams};
pub use variant::ModelVariant;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
