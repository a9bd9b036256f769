#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/demora-analytics/demora/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builder;
pub mod error;
pub mod matrix;
pub mod schema;
pub mod seed;
pub mod stats;
pub mod synthetic;
pub mod warning;

pub use builder::{
    BuildConfig, BuildError, BuiltMatrix, Exclusion, ExclusionReason, FeatureMatrixBuilder,
    TargetMode,
};
pub use error::{ConfigurationError, DataIntegrityError};
pub use matrix::{FeatureMatrix, Observation, ObservationKey};
pub use schema::{FeatureCategory, FeatureSchema, FeatureSpec};
pub use seed::SeedSequence;
pub use stats::Summary;
pub use synthetic::SyntheticConfig;
pub use warning::Warning;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
