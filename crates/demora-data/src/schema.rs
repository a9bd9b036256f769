//! Feature Catalog
//!
//! Declares the named numeric features a feature matrix carries, with their
//! units and valid ranges. The standard catalog covers the municipal
//! demographic, economic, and hazard indicators of the harmonized dataset;
//! lagged population features are appended by the builder.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity column holding the municipality identifier
pub const MUNICIPALITY_ID: &str = "municipality_id";
/// Identity column holding the integer period (usually a year)
pub const PERIOD: &str = "period";
/// Column holding the population count used for targets and lags
pub const POPULATION: &str = "population";

/// Total fertility rate
pub const FERTILITY_RATE: &str = "fertility_rate";
/// Median age of residents
pub const MEDIAN_AGE: &str = "median_age";
/// Dependents per 100 working-age residents
pub const AGE_DEPENDENCY_RATIO: &str = "age_dependency_ratio";
/// Labor-force participation rate
pub const LABOR_FORCE_PARTICIPATION: &str = "labor_force_participation";
/// Unemployment rate
pub const UNEMPLOYMENT_RATE: &str = "unemployment_rate";
/// Share of residents below the poverty line
pub const POVERTY_RATE: &str = "poverty_rate";
/// Median household income
pub const MEDIAN_HOUSEHOLD_INCOME: &str = "median_household_income";
/// Hurricane hazard-exposure index
pub const HURRICANE_EXPOSURE: &str = "hurricane_exposure";
/// Earthquake hazard-exposure index
pub const EARTHQUAKE_EXPOSURE: &str = "earthquake_exposure";

/// Feature categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    /// Age structure and fertility
    Demographic,
    /// Labor market, income, and poverty
    Economic,
    /// Natural hazard exposure
    Hazard,
    /// Lagged population counts
    LaggedPopulation,
    /// Anything outside the standard catalog
    Other,
}

/// Metadata for one feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Column name (unique within a schema)
    pub name: String,
    /// Feature category
    pub category: FeatureCategory,
    /// Unit of measurement
    pub unit: String,
    /// Brief description
    #[serde(default)]
    pub description: String,
    /// Inclusive lower bound of valid values
    pub min: f64,
    /// Inclusive upper bound of valid values
    pub max: f64,
}

impl FeatureSpec {
    /// Create a feature with a declared valid range
    pub fn new(
        name: impl Into<String>,
        category: FeatureCategory,
        unit: impl Into<String>,
        description: impl Into<String>,
        range: (f64, f64),
    ) -> Self {
        Self {
            name: name.into(),
            category,
            unit: unit.into(),
            description: description.into(),
            min: range.0,
            max: range.1,
        }
    }

    /// Create a feature accepting any finite value
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FeatureCategory::Other,
            "unitless",
            "",
            (f64::MIN, f64::MAX),
        )
    }

    /// Population `lag` periods before the observation period
    pub fn population_lag(lag: usize) -> Self {
        Self::new(
            lag_feature_name(lag),
            FeatureCategory::LaggedPopulation,
            "persons",
            format!("Population {lag} period(s) before the observation"),
            (0.0, f64::MAX),
        )
    }

    /// Whether a value is acceptable for this feature.
    ///
    /// `NaN` marks an explicit missing value and is always accepted.
    pub fn accepts(&self, value: f64) -> bool {
        value.is_nan() || (value.is_finite() && value >= self.min && value <= self.max)
    }
}

/// Name of the lagged-population feature for `lag`
pub fn lag_feature_name(lag: usize) -> String {
    format!("population_lag_{lag}")
}

/// Ordered list of feature declarations
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    /// Create a schema from feature declarations (order is preserved)
    pub const fn new(features: Vec<FeatureSpec>) -> Self {
        Self { features }
    }

    /// Schema of unbounded features with the given names
    pub fn unbounded<S: AsRef<str>>(names: &[S]) -> Self {
        Self::new(
            names
                .iter()
                .map(|n| FeatureSpec::unbounded(n.as_ref()))
                .collect(),
        )
    }

    /// The standard municipal catalog
    pub fn standard() -> Self {
        use FeatureCategory::{Demographic, Economic, Hazard};

        Self::new(vec![
            FeatureSpec::new(
                FERTILITY_RATE,
                Demographic,
                "births per woman",
                "Total fertility rate",
                (0.0, 10.0),
            ),
            FeatureSpec::new(
                MEDIAN_AGE,
                Demographic,
                "years",
                "Median age of residents",
                (0.0, 120.0),
            ),
            FeatureSpec::new(
                AGE_DEPENDENCY_RATIO,
                Demographic,
                "dependents per 100 working-age",
                "Residents under 15 or over 64 per 100 aged 15-64",
                (0.0, 500.0),
            ),
            FeatureSpec::new(
                LABOR_FORCE_PARTICIPATION,
                Economic,
                "percent",
                "Labor-force participation rate",
                (0.0, 100.0),
            ),
            FeatureSpec::new(
                UNEMPLOYMENT_RATE,
                Economic,
                "percent",
                "Unemployment rate",
                (0.0, 100.0),
            ),
            FeatureSpec::new(
                POVERTY_RATE,
                Economic,
                "percent",
                "Share of residents below the poverty line",
                (0.0, 100.0),
            ),
            FeatureSpec::new(
                MEDIAN_HOUSEHOLD_INCOME,
                Economic,
                "USD",
                "Median household income",
                (0.0, 10_000_000.0),
            ),
            FeatureSpec::new(
                HURRICANE_EXPOSURE,
                Hazard,
                "index",
                "Hurricane hazard-exposure index",
                (0.0, 1.0),
            ),
            FeatureSpec::new(
                EARTHQUAKE_EXPOSURE,
                Hazard,
                "index",
                "Earthquake hazard-exposure index",
                (0.0, 1.0),
            ),
        ])
    }

    /// Copy of this schema with lagged-population features appended
    pub fn with_lags(&self, lags: &[usize]) -> Self {
        let mut features = self.features.clone();
        for &lag in lags {
            let spec = FeatureSpec::population_lag(lag);
            if !features.iter().any(|f| f.name == spec.name) {
                features.push(spec);
            }
        }
        Self { features }
    }

    /// Feature declarations in order
    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    /// Feature names in order
    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name.as_str()).collect()
    }

    /// Number of features
    pub const fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the schema declares no features
    pub const fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Position of a feature
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }

    /// Feature declaration by name
    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Whether a feature is declared
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Features of one category
    pub fn by_category(&self, category: FeatureCategory) -> Vec<&FeatureSpec> {
        self.features
            .iter()
            .filter(|f| f.category == category)
            .collect()
    }

    /// Count features by category
    pub fn count_by_category(&self) -> HashMap<FeatureCategory, usize> {
        let mut counts = HashMap::new();
        for feature in &self.features {
            *counts.entry(feature.category).or_insert(0) += 1;
        }
        counts
    }

    /// Names declared more than once
    pub fn duplicate_names(&self) -> Vec<&str> {
        let mut seen = HashMap::new();
        let mut duplicates = Vec::new();
        for feature in &self.features {
            let count = seen.entry(feature.name.as_str()).or_insert(0usize);
            *count += 1;
            if *count == 2 {
                duplicates.push(feature.name.as_str());
            }
        }
        duplicates
    }
}
