//! Pipeline errors.

use demora_data::{BuildError, ConfigurationError, DataIntegrityError};
use demora_forecast::ModelFitError;
use demora_risk::ScoringError;
use demora_typology::TypologyError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from [`crate::Pipeline`] and [`crate::PipelineConfig`]
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The harmonized table could not be turned into a matrix
    #[error("Matrix build failed: {0}")]
    Build(#[from] BuildError),

    /// Row selection failed
    #[error(transparent)]
    Data(#[from] DataIntegrityError),

    /// Fitting, cross-validation, or attribution failed
    #[error("Forecasting failed: {0}")]
    Model(#[from] ModelFitError),

    /// Every variant failed cross-validation
    #[error("No model variant could be evaluated")]
    NoViableVariant,

    /// Clustering failed
    #[error("Typology failed: {0}")]
    Typology(#[from] TypologyError),

    /// Scoring failed
    #[error("Scoring failed: {0}")]
    Scoring(#[from] ScoringError),

    /// The configuration file could not be read
    #[error("Cannot read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON
    #[error("Cannot parse config: {0}")]
    Json(#[from] serde_json::Error),
}
