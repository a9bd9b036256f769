//! Feature Matrix Builder
//!
//! Assembles a per-(municipality, period) feature/target matrix from the
//! harmonized table delivered by upstream ingestion.
//!
//! The target for municipality `m` at period `t` is the percent population
//! change over the horizon:
//!
//! target(m, t) = 100 * (pop(m, t+h) - pop(m, t)) / pop(m, t)
//!
//! where `t+h` is the period `h` positions after `t` in the sorted list of
//! distinct periods present in the input. Lagged population features use the
//! same ordinal arithmetic. Observations that cannot be completed are dropped
//! and recorded as [`Exclusion`]s rather than repaired.

use crate::error::{ConfigurationError, DataIntegrityError};
use crate::matrix::{FeatureMatrix, ObservationKey};
use crate::schema::{FeatureSchema, FeatureSpec, MUNICIPALITY_ID, PERIOD, POPULATION};
use crate::warning::Warning;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from [`FeatureMatrixBuilder::build`]
#[derive(Debug, Error)]
pub enum BuildError {
    /// The harmonized table violates the schema
    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),

    /// The build options are invalid
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl From<PolarsError> for BuildError {
    fn from(err: PolarsError) -> Self {
        Self::Integrity(DataIntegrityError::Polars(err))
    }
}

/// Whether the horizon target must be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// Training data: rows without a target are excluded
    #[default]
    Required,
    /// Scoring-only data: no target column
    Withheld,
    /// Target where the horizon is observed, `NaN` elsewhere
    WhereAvailable,
}

/// Options for one build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Number of periods ahead the target looks
    pub horizon: usize,
    /// Periods to build rows for (empty = every period in the input)
    pub reference_periods: Vec<i32>,
    /// Lags (in periods) of the population features to derive
    pub lags: Vec<usize>,
    /// Target handling
    pub target: TargetMode,
}

impl BuildConfig {
    /// Training build over the given periods
    pub fn training(horizon: usize, reference_periods: Vec<i32>) -> Self {
        Self {
            horizon,
            reference_periods,
            lags: Vec::new(),
            target: TargetMode::Required,
        }
    }

    /// Add lagged population features
    pub fn with_lags(mut self, lags: Vec<usize>) -> Self {
        self.lags = lags;
        self
    }

    /// Change the target handling
    pub const fn with_target(mut self, target: TargetMode) -> Self {
        self.target = target;
        self
    }

    /// Fail-fast validation
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.horizon == 0 {
            return Err(ConfigurationError::InvalidHorizon);
        }
        if self.lags.contains(&0) {
            return Err(ConfigurationError::invalid("lags", "lag 0 is the current period"));
        }
        Ok(())
    }
}

/// Why an observation was dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// The requested period does not occur in the input
    UnknownPeriod,
    /// No input row for the municipality at this period
    MissingRow,
    /// Population is null
    MissingPopulation,
    /// Population is zero or negative, so percent change is undefined
    NonPositivePopulation,
    /// The input has no period `horizon` positions later
    MissingTargetPeriod,
    /// The municipality has no population at the target period
    MissingTargetObservation,
    /// The input has no period `lag` positions earlier
    MissingLagPeriod {
        /// Lag in periods
        lag: usize,
    },
    /// The municipality has no population at the lag period
    MissingLagObservation {
        /// Lag in periods
        lag: usize,
    },
}

/// A dropped (municipality, period) with its reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    /// Observation that was dropped
    pub key: ObservationKey,
    /// Why it was dropped
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

/// Output of a build
#[derive(Debug, Clone)]
pub struct BuiltMatrix {
    /// Rectangular feature matrix, rows sorted by (period, municipality_id)
    pub matrix: FeatureMatrix,
    /// Observations dropped for incomplete data
    pub exclusions: Vec<Exclusion>,
    /// Degenerate-data diagnostics
    pub warnings: Vec<Warning>,
}

/// Validated harmonized rows, indexed by key
struct HarmonizedRows {
    /// Row index by (municipality, period)
    index: BTreeMap<ObservationKey, usize>,
    municipalities: Vec<String>,
    periods: Vec<i32>,
    population: Vec<Option<f64>>,
    /// Feature values by schema position, then input row
    features: Vec<Vec<Option<f64>>>,
}

impl HarmonizedRows {
    fn population_at(&self, municipality_id: &str, period: i32) -> Option<Option<f64>> {
        self.index
            .get(&ObservationKey::new(municipality_id, period))
            .map(|&row| self.population[row])
    }
}

/// Builds feature matrices for a fixed feature schema
#[derive(Debug, Clone)]
pub struct FeatureMatrixBuilder {
    schema: FeatureSchema,
}

impl Default for FeatureMatrixBuilder {
    fn default() -> Self {
        Self::new(FeatureSchema::standard())
    }
}

impl FeatureMatrixBuilder {
    /// Create a builder for the declared features
    pub const fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    /// Declared features (without derived lags)
    pub const fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Build a matrix from the harmonized table
    ///
    /// # Arguments
    /// * `inputs` - One row per (municipality_id, period) with `population` and
    ///   every declared feature
    /// * `config` - Horizon, reference periods, lags, and target handling
    ///
    /// # Errors
    /// * `DataIntegrityError` for missing columns or features, duplicate keys,
    ///   null keys, out-of-range values, or when no row survives
    /// * `ConfigurationError` for a zero horizon or zero lag
    pub fn build(
        &self,
        inputs: &DataFrame,
        config: &BuildConfig,
    ) -> Result<BuiltMatrix, BuildError> {
        config.validate()?;
        if let Some(duplicate) = self.schema.duplicate_names().first() {
            return Err(ConfigurationError::invalid(
                "schema",
                format!("feature '{duplicate}' declared twice"),
            )
            .into());
        }
        if inputs.height() == 0 {
            return Err(
                DataIntegrityError::EmptyMatrix("harmonized input has no rows".to_string()).into(),
            );
        }

        let rows = self.read_rows(inputs)?;
        let period_position: HashMap<i32, usize> = rows
            .periods
            .iter()
            .enumerate()
            .map(|(i, &p)| (p, i))
            .collect();

        let reference_periods: Vec<i32> = if config.reference_periods.is_empty() {
            rows.periods.clone()
        } else {
            config
                .reference_periods
                .iter()
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };

        let output_schema = self.schema.with_lags(&config.lags);
        let lag_specs: Vec<(usize, FeatureSpec)> = config
            .lags
            .iter()
            .map(|&lag| (lag, FeatureSpec::population_lag(lag)))
            .collect();

        let mut keys = Vec::new();
        let mut values = Vec::new();
        let mut targets = Vec::new();
        let mut exclusions = Vec::new();

        for &period in &reference_periods {
            for municipality in &rows.municipalities {
                let key = ObservationKey::new(municipality.as_str(), period);
                match self.assemble_row(&rows, &period_position, &key, config, &output_schema) {
                    Ok((row, target)) => {
                        keys.push(key);
                        values.extend(row);
                        targets.push(target);
                    }
                    Err(reason) => {
                        debug!(key = %key, ?reason, "excluding observation");
                        exclusions.push(Exclusion { key, reason });
                    }
                }
            }
        }

        if keys.is_empty() {
            return Err(DataIntegrityError::EmptyMatrix(format!(
                "all {} requested observations were excluded",
                exclusions.len()
            ))
            .into());
        }

        // Lag values are declared non-negative; anything else is an integrity failure.
        for (i, key) in keys.iter().enumerate() {
            for (offset, (_, spec)) in lag_specs.iter().enumerate() {
                let value = values[i * output_schema.len() + self.schema.len() + offset];
                check_range(spec, key, value)?;
            }
        }

        let n_rows = keys.len();
        let features = Array2::from_shape_vec((n_rows, output_schema.len()), values)
            .map_err(|e| DataIntegrityError::Ragged(e.to_string()))?;
        let target = match config.target {
            TargetMode::Withheld => None,
            TargetMode::Required | TargetMode::WhereAvailable => Some(Array1::from_vec(targets)),
        };

        let matrix = FeatureMatrix::new(output_schema, keys, features, target)?;
        let warnings: Vec<Warning> = matrix
            .zero_variance_features()
            .into_iter()
            .map(|feature| {
                warn!(feature, "zero-variance feature in built matrix");
                Warning::ZeroVarianceFeature {
                    feature: feature.to_string(),
                }
            })
            .collect();

        info!(
            rows = matrix.nrows(),
            features = matrix.nfeatures(),
            excluded = exclusions.len(),
            horizon = config.horizon,
            "built feature matrix"
        );

        Ok(BuiltMatrix {
            matrix,
            exclusions,
            warnings,
        })
    }

    /// Read and validate the harmonized table
    fn read_rows(&self, inputs: &DataFrame) -> Result<HarmonizedRows, BuildError> {
        let ids = string_column(inputs, MUNICIPALITY_ID)?;
        let periods = integer_column(inputs, PERIOD)?;
        let population = float_column(inputs, POPULATION)?;

        let mut features = Vec::with_capacity(self.schema.len());
        for spec in self.schema.features() {
            let column = float_column(inputs, &spec.name).map_err(|e| match e {
                BuildError::Integrity(DataIntegrityError::MissingColumn(name)) => {
                    BuildError::Integrity(DataIntegrityError::MissingFeature(name))
                }
                other => other,
            })?;
            if column.iter().all(Option::is_none) {
                return Err(DataIntegrityError::MissingFeature(spec.name.clone()).into());
            }
            features.push(column);
        }

        let mut index = BTreeMap::new();
        for row in 0..inputs.height() {
            let municipality_id = ids[row].clone().ok_or_else(|| DataIntegrityError::NullKey {
                column: MUNICIPALITY_ID.to_string(),
                row,
            })?;
            let period = periods[row].ok_or_else(|| DataIntegrityError::NullKey {
                column: PERIOD.to_string(),
                row,
            })?;
            let period = i32::try_from(period).map_err(|_| DataIntegrityError::OutOfRange {
                feature: PERIOD.to_string(),
                municipality_id: municipality_id.clone(),
                period: 0,
                value: period as f64,
                min: f64::from(i32::MIN),
                max: f64::from(i32::MAX),
            })?;
            let key = ObservationKey::new(municipality_id, period);

            for (spec, column) in self.schema.features().iter().zip(&features) {
                check_range(spec, &key, column[row].unwrap_or(f64::NAN))?;
            }

            if index.insert(key.clone(), row).is_some() {
                return Err(DataIntegrityError::DuplicateKey {
                    municipality_id: key.municipality_id,
                    period: key.period,
                }
                .into());
            }
        }

        let municipalities: Vec<String> = index
            .keys()
            .map(|k| k.municipality_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let periods: Vec<i32> = index
            .keys()
            .map(|k| k.period)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(HarmonizedRows {
            index,
            municipalities,
            periods,
            population,
            features,
        })
    }

    /// Feature row and target for one key, or the reason it cannot be built
    fn assemble_row(
        &self,
        rows: &HarmonizedRows,
        period_position: &HashMap<i32, usize>,
        key: &ObservationKey,
        config: &BuildConfig,
        output_schema: &FeatureSchema,
    ) -> Result<(Vec<f64>, f64), ExclusionReason> {
        let position = *period_position
            .get(&key.period)
            .ok_or(ExclusionReason::UnknownPeriod)?;
        let row = *rows.index.get(key).ok_or(ExclusionReason::MissingRow)?;
        let population = rows.population[row].ok_or(ExclusionReason::MissingPopulation)?;
        if population <= 0.0 || !population.is_finite() {
            return Err(ExclusionReason::NonPositivePopulation);
        }

        let mut values = Vec::with_capacity(output_schema.len());
        values.extend(rows.features.iter().map(|column| column[row].unwrap_or(f64::NAN)));

        for &lag in &config.lags {
            let lag_position = position
                .checked_sub(lag)
                .ok_or(ExclusionReason::MissingLagPeriod { lag })?;
            let lag_period = rows.periods[lag_position];
            let lag_population = rows
                .population_at(&key.municipality_id, lag_period)
                .flatten()
                .ok_or(ExclusionReason::MissingLagObservation { lag })?;
            values.push(lag_population);
        }

        let target = match config.target {
            TargetMode::Withheld => f64::NAN,
            TargetMode::Required => {
                let future = future_population(rows, key, position, config.horizon)?;
                percent_change(population, future)
            }
            TargetMode::WhereAvailable => {
                future_population(rows, key, position, config.horizon)
                    .map_or(f64::NAN, |future| percent_change(population, future))
            }
        };

        Ok((values, target))
    }
}

/// Population `horizon` periods after the key's period
fn future_population(
    rows: &HarmonizedRows,
    key: &ObservationKey,
    position: usize,
    horizon: usize,
) -> Result<f64, ExclusionReason> {
    let future_period = position
        .checked_add(horizon)
        .and_then(|p| rows.periods.get(p))
        .ok_or(ExclusionReason::MissingTargetPeriod)?;
    rows.population_at(&key.municipality_id, *future_period)
        .flatten()
        .filter(|p| p.is_finite())
        .ok_or(ExclusionReason::MissingTargetObservation)
}

fn percent_change(from: f64, to: f64) -> f64 {
    100.0 * (to - from) / from
}

fn check_range(
    spec: &FeatureSpec,
    key: &ObservationKey,
    value: f64,
) -> Result<(), DataIntegrityError> {
    if spec.accepts(value) {
        Ok(())
    } else {
        Err(DataIntegrityError::OutOfRange {
            feature: spec.name.clone(),
            municipality_id: key.municipality_id.clone(),
            period: key.period,
            value,
            min: spec.min,
            max: spec.max,
        })
    }
}

fn column_as(inputs: &DataFrame, name: &str, dtype: &DataType) -> Result<Series, BuildError> {
    let column = inputs
        .column(name)
        .map_err(|_| DataIntegrityError::MissingColumn(name.to_string()))?;
    Ok(column.as_materialized_series().cast(dtype)?)
}

fn float_column(inputs: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, BuildError> {
    let series = column_as(inputs, name, &DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

fn integer_column(inputs: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, BuildError> {
    let series = column_as(inputs, name, &DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

fn string_column(inputs: &DataFrame, name: &str) -> Result<Vec<Option<String>>, BuildError> {
    let series = column_as(inputs, name, &DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn inputs() -> DataFrame {
        df!(
            "municipality_id" => &["a", "a", "a", "b", "b", "b"],
            "period" => &[2010i64, 2011, 2012, 2010, 2011, 2012],
            "population" => &[Some(100.0), Some(90.0), Some(81.0), Some(50.0), None, Some(55.0)],
            "x" => &[Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0), None],
        )
        .unwrap()
    }

    fn builder() -> FeatureMatrixBuilder {
        FeatureMatrixBuilder::new(FeatureSchema::unbounded(&["x"]))
    }

    #[test]
    fn test_target_is_percent_change() {
        let built = builder()
            .build(&inputs(), &BuildConfig::training(1, vec![2010, 2011]))
            .unwrap();
        let m = &built.matrix;

        // a@2010, a@2011 survive; b@2010 lacks its target, b@2011 its population
        assert_eq!(m.nrows(), 2);
        assert_eq!(m.keys()[0], ObservationKey::new("a", 2010));
        assert_relative_eq!(m.target().unwrap()[0], -10.0, epsilon = 1e-12);
        assert_relative_eq!(m.target().unwrap()[1], -10.0, epsilon = 1e-12);

        assert!(built.exclusions.contains(&Exclusion {
            key: ObservationKey::new("b", 2010),
            reason: ExclusionReason::MissingTargetObservation,
        }));
        assert!(built.exclusions.contains(&Exclusion {
            key: ObservationKey::new("b", 2011),
            reason: ExclusionReason::MissingPopulation,
        }));
    }

    #[test]
    fn test_horizon_beyond_input() {
        let built = builder()
            .build(&inputs(), &BuildConfig::training(2, vec![]))
            .unwrap();
        // a@2010 -> a@2012 and b@2010 -> b@2012 (b@2011 has no population but is skipped over)
        assert_eq!(built.matrix.nrows(), 2);
        assert_relative_eq!(built.matrix.target().unwrap()[0], -19.0, epsilon = 1e-12);
        assert_relative_eq!(built.matrix.target().unwrap()[1], 10.0, epsilon = 1e-12);
        assert!(built.exclusions.iter().any(|e| e.key.period == 2012
            && e.reason == ExclusionReason::MissingTargetPeriod));
    }

    #[test]
    fn test_horizon_past_index_range() {
        let err = builder()
            .build(&inputs(), &BuildConfig::training(usize::MAX, vec![]))
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Integrity(DataIntegrityError::EmptyMatrix(_))
        ));

        let config =
            BuildConfig::training(usize::MAX, vec![]).with_target(TargetMode::WhereAvailable);
        let built = builder().build(&inputs(), &config).unwrap();
        assert!(built.matrix.nrows() > 0);
        assert!(built.matrix.target().unwrap().iter().all(|t| t.is_nan()));
    }

    #[test]
    fn test_lags_and_withheld_target() {
        let config = BuildConfig::training(1, vec![2012])
            .with_lags(vec![1, 2])
            .with_target(TargetMode::Withheld);
        let built = builder().build(&inputs(), &config).unwrap();
        let m = &built.matrix;

        assert!(!m.has_target());
        assert_eq!(m.feature_names(), vec!["x", "population_lag_1", "population_lag_2"]);
        assert_eq!(m.nrows(), 1);
        assert_eq!(m.observation(0).get("population_lag_1"), Some(90.0));
        assert_eq!(m.observation(0).get("population_lag_2"), Some(100.0));
        assert_eq!(
            built.exclusions[0].reason,
            ExclusionReason::MissingLagObservation { lag: 1 }
        );
    }

    #[test]
    fn test_where_available_target() {
        let config = BuildConfig::training(1, vec![])
            .with_target(TargetMode::WhereAvailable);
        let built = builder().build(&inputs(), &config).unwrap();
        let m = &built.matrix;
        let last = m
            .observations()
            .position(|o| o.key == &ObservationKey::new("a", 2012))
            .unwrap();
        assert!(m.target().unwrap()[last].is_nan());
        // Missing feature values stay explicit
        assert_eq!(m.missing_feature_count(), 1);
    }

    #[test]
    fn test_missing_feature_column() {
        let builder = FeatureMatrixBuilder::new(FeatureSchema::unbounded(&["x", "y"]));
        let err = builder
            .build(&inputs(), &BuildConfig::training(1, vec![]))
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Integrity(DataIntegrityError::MissingFeature(ref f)) if f == "y"
        ));
    }

    #[test]
    fn test_all_null_feature_is_absent() {
        let df = df!(
            "municipality_id" => &["a", "a"],
            "period" => &[2010i64, 2011],
            "population" => &[10.0, 11.0],
            "x" => &[None::<f64>, None],
        )
        .unwrap();
        let err = builder()
            .build(&df, &BuildConfig::training(1, vec![]))
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Integrity(DataIntegrityError::MissingFeature(_))
        ));
    }

    #[test]
    fn test_duplicate_key() {
        let df = df!(
            "municipality_id" => &["a", "a"],
            "period" => &[2010i64, 2010],
            "population" => &[10.0, 11.0],
            "x" => &[1.0, 2.0],
        )
        .unwrap();
        let err = builder()
            .build(&df, &BuildConfig::training(1, vec![]))
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Integrity(DataIntegrityError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_out_of_range_value() {
        let schema = FeatureSchema::new(vec![FeatureSpec::new(
            "x",
            crate::schema::FeatureCategory::Hazard,
            "index",
            "",
            (0.0, 1.0),
        )]);
        let err = FeatureMatrixBuilder::new(schema)
            .build(&inputs(), &BuildConfig::training(1, vec![]))
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Integrity(DataIntegrityError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let err = builder()
            .build(&inputs(), &BuildConfig::training(0, vec![]))
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Configuration(ConfigurationError::InvalidHorizon)
        ));
    }

    #[test]
    fn test_unknown_period_excluded() {
        let built = builder()
            .build(&inputs(), &BuildConfig::training(1, vec![2010, 1990]))
            .unwrap();
        assert_eq!(
            built
                .exclusions
                .iter()
                .filter(|e| e.reason == ExclusionReason::UnknownPeriod)
                .count(),
            2
        );
    }

    #[test]
    fn test_everything_excluded_is_error() {
        let err = builder()
            .build(&inputs(), &BuildConfig::training(5, vec![]))
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Integrity(DataIntegrityError::EmptyMatrix(_))
        ));
    }
}
