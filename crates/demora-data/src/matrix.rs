//! Feature Matrix
//!
//! An ordered, immutable collection of observations sharing one feature
//! schema. Features are stored row-major in an `Array2<f64>` (rows =
//! observations, columns = schema features); `NaN` marks an explicit missing
//! value. The target column is optional so the same type serves training and
//! scoring-only data.
//!
//! All transformations (row selection, column replacement, target removal)
//! return new matrices.

use crate::error::DataIntegrityError;
use crate::schema::FeatureSchema;
use crate::stats::column_summary;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique identifier of an observation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObservationKey {
    /// Municipality identifier
    pub municipality_id: String,
    /// Period (usually a year)
    pub period: i32,
}

impl ObservationKey {
    /// Create a key
    pub fn new(municipality_id: impl Into<String>, period: i32) -> Self {
        Self {
            municipality_id: municipality_id.into(),
            period,
        }
    }
}

impl fmt::Display for ObservationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.municipality_id, self.period)
    }
}

/// Borrowed view of one row
#[derive(Debug, Clone)]
pub struct Observation<'a> {
    /// Row key
    pub key: &'a ObservationKey,
    /// Feature values in schema order
    pub features: ArrayView1<'a, f64>,
    /// Target value, if the matrix carries one
    pub target: Option<f64>,
    schema: &'a FeatureSchema,
}

impl Observation<'_> {
    /// Value of a named feature
    pub fn get(&self, feature: &str) -> Option<f64> {
        self.schema.index_of(feature).map(|j| self.features[j])
    }
}

/// Rectangular (observation x feature) matrix with an optional target
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    schema: FeatureSchema,
    keys: Vec<ObservationKey>,
    features: Array2<f64>,
    target: Option<Array1<f64>>,
}

impl FeatureMatrix {
    /// Assemble a matrix, checking its invariants
    ///
    /// # Errors
    /// * `EmptyMatrix` if there are no rows
    /// * `Ragged` if shapes disagree with the schema or keys
    /// * `DuplicateKey` if a (municipality, period) key repeats
    pub fn new(
        schema: FeatureSchema,
        keys: Vec<ObservationKey>,
        features: Array2<f64>,
        target: Option<Array1<f64>>,
    ) -> Result<Self, DataIntegrityError> {
        if keys.is_empty() {
            return Err(DataIntegrityError::EmptyMatrix("no observations".to_string()));
        }
        if features.nrows() != keys.len() {
            return Err(DataIntegrityError::Ragged(format!(
                "{} keys but {} feature rows",
                keys.len(),
                features.nrows()
            )));
        }
        if features.ncols() != schema.len() {
            return Err(DataIntegrityError::Ragged(format!(
                "schema declares {} features but matrix has {} columns",
                schema.len(),
                features.ncols()
            )));
        }
        if let Some(duplicate) = schema.duplicate_names().first() {
            return Err(DataIntegrityError::Ragged(format!(
                "feature '{duplicate}' declared twice"
            )));
        }
        if let Some(target) = &target {
            if target.len() != keys.len() {
                return Err(DataIntegrityError::Ragged(format!(
                    "{} keys but {} target values",
                    keys.len(),
                    target.len()
                )));
            }
        }

        let mut seen = BTreeSet::new();
        for key in &keys {
            if !seen.insert(key) {
                return Err(DataIntegrityError::DuplicateKey {
                    municipality_id: key.municipality_id.clone(),
                    period: key.period,
                });
            }
        }

        Ok(Self {
            schema,
            keys,
            features,
            target,
        })
    }

    /// Number of observations
    pub fn nrows(&self) -> usize {
        self.keys.len()
    }

    /// Number of features
    pub fn nfeatures(&self) -> usize {
        self.features.ncols()
    }

    /// Feature schema
    pub const fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Feature names in column order
    pub fn feature_names(&self) -> Vec<&str> {
        self.schema.names()
    }

    /// Row keys in row order
    pub fn keys(&self) -> &[ObservationKey] {
        &self.keys
    }

    /// Feature values (rows x features)
    pub const fn features(&self) -> &Array2<f64> {
        &self.features
    }

    /// Target values, if present
    pub const fn target(&self) -> Option<&Array1<f64>> {
        self.target.as_ref()
    }

    /// Whether the matrix carries a target column
    pub const fn has_target(&self) -> bool {
        self.target.is_some()
    }

    /// Column of a named feature
    pub fn column(&self, feature: &str) -> Option<ArrayView1<'_, f64>> {
        self.schema
            .index_of(feature)
            .map(|j| self.features.column(j))
    }

    /// View of row `i`
    ///
    /// # Panics
    /// Panics if `i` is out of bounds.
    pub fn observation(&self, i: usize) -> Observation<'_> {
        Observation {
            key: &self.keys[i],
            features: self.features.row(i),
            target: self.target.as_ref().map(|t| t[i]),
            schema: &self.schema,
        }
    }

    /// Iterate over all rows
    pub fn observations(&self) -> impl Iterator<Item = Observation<'_>> {
        (0..self.nrows()).map(move |i| self.observation(i))
    }

    /// Distinct periods in ascending order
    pub fn periods(&self) -> Vec<i32> {
        self.keys
            .iter()
            .map(|k| k.period)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct municipalities in ascending order
    pub fn municipalities(&self) -> Vec<&str> {
        self.keys
            .iter()
            .map(|k| k.municipality_id.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of missing feature values
    pub fn missing_feature_count(&self) -> usize {
        self.features.iter().filter(|v| v.is_nan()).count()
    }

    /// Number of missing target values (0 when the target is absent)
    pub fn missing_target_count(&self) -> usize {
        self.target
            .as_ref()
            .map_or(0, |t| t.iter().filter(|v| v.is_nan()).count())
    }

    /// Features whose observed values never vary
    pub fn zero_variance_features(&self) -> Vec<&str> {
        self.schema
            .names()
            .into_iter()
            .enumerate()
            .filter(|(j, _)| {
                column_summary(self.features.column(*j)).is_some_and(|s| s.std < 1e-12)
            })
            .map(|(_, name)| name)
            .collect()
    }

    /// New matrix holding the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self, DataIntegrityError> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.nrows()) {
            return Err(DataIntegrityError::Ragged(format!(
                "row index {bad} out of bounds for {} rows",
                self.nrows()
            )));
        }
        let keys = rows.iter().map(|&r| self.keys[r].clone()).collect();
        let features = self.features.select(Axis(0), rows);
        let target = self.target.as_ref().map(|t| t.select(Axis(0), rows));
        Self::new(self.schema.clone(), keys, features, target)
    }

    /// Rows belonging to one period
    pub fn for_period(&self, period: i32) -> Result<Self, DataIntegrityError> {
        let rows: Vec<usize> = self
            .keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.period == period)
            .map(|(i, _)| i)
            .collect();
        if rows.is_empty() {
            return Err(DataIntegrityError::EmptyMatrix(format!(
                "no observations for period {period}"
            )));
        }
        self.select_rows(&rows)
    }

    /// New matrix with feature column `j` replaced
    pub fn with_feature_column(
        &self,
        j: usize,
        values: &Array1<f64>,
    ) -> Result<Self, DataIntegrityError> {
        if j >= self.nfeatures() || values.len() != self.nrows() {
            return Err(DataIntegrityError::Ragged(format!(
                "cannot replace column {j} with {} values",
                values.len()
            )));
        }
        let mut features = self.features.clone();
        features.column_mut(j).assign(values);
        Ok(Self {
            schema: self.schema.clone(),
            keys: self.keys.clone(),
            features,
            target: self.target.clone(),
        })
    }

    /// Copy of this matrix with the target withheld
    pub fn without_target(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            keys: self.keys.clone(),
            features: self.features.clone(),
            target: None,
        }
    }

    /// New matrix restricted to the named features, in the given order
    pub fn select_features<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, DataIntegrityError> {
        let mut specs = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let j = self
                .schema
                .index_of(name)
                .ok_or_else(|| DataIntegrityError::MissingFeature(name.to_string()))?;
            specs.push(self.schema.features()[j].clone());
            columns.push(j);
        }
        Self::new(
            FeatureSchema::new(specs),
            self.keys.clone(),
            self.features.select(Axis(1), &columns),
            self.target.clone(),
        )
    }
}
