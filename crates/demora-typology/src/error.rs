//! Errors raised by the clustering stage.

use demora_data::{ConfigurationError, DataIntegrityError};
use thiserror::Error;

/// Errors from [`crate::TypologyEngine`]
#[derive(Debug, Error)]
pub enum TypologyError {
    /// Clustering needs one row per municipality, i.e. a single period
    #[error("Clustering input must hold a single period, found {0:?}")]
    MultiplePeriods(Vec<i32>),

    /// A clustering feature has missing values
    #[error("Feature '{feature}' has {count} missing values")]
    MissingValues {
        /// Feature name
        feature: String,
        /// Number of missing values
        count: usize,
    },

    /// More clusters requested than municipalities
    #[error("Cannot form {k} clusters from {rows} municipalities")]
    TooFewRows {
        /// Requested cluster count
        k: usize,
        /// Available rows
        rows: usize,
    },

    /// Invalid options
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Feature selection failed
    #[error(transparent)]
    Data(#[from] DataIntegrityError),
}
