//! Errors raised while fitting, predicting, or evaluating a model.

use demora_data::{ConfigurationError, DataIntegrityError};
use thiserror::Error;

/// Errors from the supervised stage
#[derive(Debug, Error)]
pub enum ModelFitError {
    /// Not enough training rows for the variant
    #[error("{variant} needs at least {required} training rows, got {actual}")]
    InsufficientRows {
        /// Variant display name
        variant: String,
        /// Minimum number of rows
        required: usize,
        /// Rows supplied
        actual: usize,
    },

    /// Feature values are missing (`NaN`)
    #[error("{count} missing feature values")]
    MissingValues {
        /// Number of missing cells
        count: usize,
    },

    /// The matrix has no target, or the target has missing values
    #[error("Target is missing: {0}")]
    MissingTarget(String),

    /// A hyperparameter is out of its valid range
    #[error("Invalid hyperparameter for {variant}: {reason}")]
    InvalidHyperparameter {
        /// Variant family
        variant: String,
        /// Why it was rejected
        reason: String,
    },

    /// The normal equations are not positive definite
    #[error("Singular system: {0}")]
    SingularSystem(String),

    /// The matrix features differ from those the model was trained on
    #[error("Schema mismatch: trained on {expected:?}, got {actual:?}")]
    SchemaMismatch {
        /// Training feature names
        expected: Vec<String>,
        /// Supplied feature names
        actual: Vec<String>,
    },

    /// Every cross-validation fold was skipped
    #[error("No fold could be scored ({0} skipped)")]
    NoScorableFolds(usize),

    /// Row selection failed
    #[error(transparent)]
    Data(#[from] DataIntegrityError),

    /// Invalid evaluation options
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl ModelFitError {
    pub(crate) fn hyperparameter(variant: &str, reason: impl Into<String>) -> Self {
        Self::InvalidHyperparameter {
            variant: variant.to_string(),
            reason: reason.into(),
        }
    }
}
