//! Errors raised while scoring vulnerability.

use demora_data::{ConfigurationError, DataIntegrityError};
use demora_forecast::ModelFitError;
use thiserror::Error;

/// Errors from [`crate::VulnerabilityScorer::score`]
#[derive(Debug, Error)]
pub enum ScoringError {
    /// No rows for the scoring period
    #[error("No observations for period {0}")]
    EmptyPeriod(i32),

    /// A municipality of the period has no cluster label
    #[error("Municipality '{0}' has no cluster label")]
    MissingLabel(String),

    /// An indicator value is missing
    #[error("Indicator '{feature}' is missing for municipality '{municipality_id}'")]
    MissingIndicator {
        /// Indicator feature
        feature: String,
        /// Municipality identifier
        municipality_id: String,
    },

    /// Weights or indicators are invalid
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Row selection failed
    #[error(transparent)]
    Data(#[from] DataIntegrityError),

    /// The fitted model could not predict the period
    #[error("Prediction failed: {0}")]
    Prediction(#[from] ModelFitError),
}
