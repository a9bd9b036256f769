//! Error types shared by every stage of the model.
//!
//! `DataIntegrityError` covers problems with the harmonized input itself and is
//! always fatal. `ConfigurationError` covers invalid options and is raised
//! before any computation starts.

use thiserror::Error;

/// Problems with the harmonized dataset or a feature matrix.
#[derive(Debug, Error)]
pub enum DataIntegrityError {
    /// A required identity column (`municipality_id`, `period`, `population`) is absent
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// A declared feature is absent from every row
    #[error("Declared feature '{0}' is absent from all rows")]
    MissingFeature(String),

    /// Two rows share the same (municipality_id, period) key
    #[error("Duplicate observation key: municipality '{municipality_id}', period {period}")]
    DuplicateKey {
        /// Municipality identifier
        municipality_id: String,
        /// Period of the duplicated row
        period: i32,
    },

    /// A key column holds a null
    #[error("Null {column} in input row {row}")]
    NullKey {
        /// Column holding the null
        column: String,
        /// Zero-based input row
        row: usize,
    },

    /// A value lies outside the declared range of its feature
    #[error(
        "Value {value} for feature '{feature}' ({municipality_id}, {period}) is outside [{min}, {max}]"
    )]
    OutOfRange {
        /// Feature name
        feature: String,
        /// Municipality identifier
        municipality_id: String,
        /// Period
        period: i32,
        /// Offending value
        value: f64,
        /// Declared lower bound
        min: f64,
        /// Declared upper bound
        max: f64,
    },

    /// Array shapes disagree with the schema or the key list
    #[error("Ragged matrix: {0}")]
    Ragged(String),

    /// A matrix must hold at least one row
    #[error("Feature matrix has no rows ({0})")]
    EmptyMatrix(String),

    /// Polars error while reading the harmonized table
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

/// Invalid configuration, detected before computation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Scoring weights must sum to one
    #[error("Scoring weights must sum to 1, got {sum}")]
    WeightsDoNotSumToOne {
        /// Actual sum of the weights
        sum: f64,
    },

    /// A weight is negative or not finite
    #[error("Invalid weight '{name}': {value}")]
    InvalidWeight {
        /// Weight name
        name: String,
        /// Offending value
        value: f64,
    },

    /// Cluster count below two
    #[error("Cluster count k must be at least 2, got {0}")]
    InvalidClusterCount(usize),

    /// Fold count below two
    #[error("Cross-validation needs at least 2 folds, got {0}")]
    InvalidFolds(usize),

    /// Forecast horizon of zero periods
    #[error("Horizon must be a positive number of periods")]
    InvalidHorizon,

    /// A referenced feature is not in the schema
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    /// An option names a value outside its fixed set
    #[error("Unknown value '{value}' for '{name}'")]
    UnknownOption {
        /// Option name
        name: String,
        /// Value that matched no known choice
        value: String,
    },

    /// Generic invalid option
    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue {
        /// Option name
        name: String,
        /// Why the value was rejected
        reason: String,
    },
}

impl ConfigurationError {
    /// Shorthand for [`ConfigurationError::InvalidValue`].
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
