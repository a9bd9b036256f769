//! Synthetic harmonized tables
//!
//! Generates a harmonized `(municipality_id, period)` table with the standard
//! catalog columns and a population series driven by a known linear
//! relationship. Used for demos, smoke tests, and property tests.
//!
//! Percent population change from period t to t+1:
//!
//! change = -0.5 * fertility_rate + 0.3 * hurricane_exposure
//!          + 0.02 * (labor_force_participation - 45) + noise

use crate::schema::{
    AGE_DEPENDENCY_RATIO, EARTHQUAKE_EXPOSURE, FERTILITY_RATE, HURRICANE_EXPOSURE,
    LABOR_FORCE_PARTICIPATION, MEDIAN_AGE, MEDIAN_HOUSEHOLD_INCOME, MUNICIPALITY_ID, PERIOD,
    POPULATION, POVERTY_RATE, UNEMPLOYMENT_RATE,
};
use crate::seed::SeedSequence;
use polars::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Shape and randomness of a synthetic table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Number of municipalities
    pub municipalities: usize,
    /// Number of consecutive periods
    pub periods: usize,
    /// First period
    pub start_period: i32,
    /// Root seed
    pub seed: u64,
    /// Half-width of the uniform noise added to each percent change
    pub noise: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            municipalities: 20,
            periods: 6,
            start_period: 2010,
            seed: 42,
            noise: 0.05,
        }
    }
}

/// Per-municipality baseline profile
struct Profile {
    fertility: f64,
    median_age: f64,
    dependency: f64,
    participation: f64,
    unemployment: f64,
    poverty: f64,
    income: f64,
    hurricane: f64,
    earthquake: f64,
    population: f64,
}

/// Percent change implied by the synthetic relationship (without noise)
pub fn expected_change(fertility: f64, hurricane: f64, participation: f64) -> f64 {
    -0.5 * fertility + 0.3 * hurricane + 0.02 * (participation - 45.0)
}

/// Generate a synthetic harmonized table
pub fn generate(config: &SyntheticConfig) -> PolarsResult<DataFrame> {
    let seeds = SeedSequence::new(config.seed);
    let capacity = config.municipalities * config.periods;

    let mut ids = Vec::with_capacity(capacity);
    let mut periods = Vec::with_capacity(capacity);
    let mut population = Vec::with_capacity(capacity);
    let mut fertility = Vec::with_capacity(capacity);
    let mut median_age = Vec::with_capacity(capacity);
    let mut dependency = Vec::with_capacity(capacity);
    let mut participation = Vec::with_capacity(capacity);
    let mut unemployment = Vec::with_capacity(capacity);
    let mut poverty = Vec::with_capacity(capacity);
    let mut income = Vec::with_capacity(capacity);
    let mut hurricane = Vec::with_capacity(capacity);
    let mut earthquake = Vec::with_capacity(capacity);

    for m in 0..config.municipalities {
        let mut rng = seeds.rng("synthetic-municipality", m as u64);
        let mut profile = Profile {
            fertility: rng.gen_range(0.8..2.2),
            median_age: rng.gen_range(30.0..50.0),
            dependency: rng.gen_range(40.0..80.0),
            participation: rng.gen_range(30.0..60.0),
            unemployment: rng.gen_range(5.0..20.0),
            poverty: rng.gen_range(30.0..60.0),
            income: rng.gen_range(15_000.0..35_000.0),
            hurricane: rng.gen_range(0.0..1.0),
            earthquake: rng.gen_range(0.0..1.0),
            population: rng.gen_range(10_000.0..200_000.0),
        };

        for t in 0..config.periods {
            ids.push(format!("M{m:03}"));
            periods.push(i64::from(config.start_period) + t as i64);
            population.push(profile.population.round());
            fertility.push(profile.fertility);
            median_age.push(profile.median_age);
            dependency.push(profile.dependency);
            participation.push(profile.participation);
            unemployment.push(profile.unemployment);
            poverty.push(profile.poverty);
            income.push(profile.income);
            hurricane.push(profile.hurricane);
            earthquake.push(profile.earthquake);

            let noise = if config.noise > 0.0 {
                rng.gen_range(-config.noise..config.noise)
            } else {
                0.0
            };
            let change = expected_change(
                profile.fertility,
                profile.hurricane,
                profile.participation,
            ) + noise;
            profile.population *= 1.0 + change / 100.0;

            // Slow drift so periods are not copies of each other
            profile.fertility = (profile.fertility + rng.gen_range(-0.05..0.05)).clamp(0.5, 3.0);
            profile.median_age = (profile.median_age + rng.gen_range(0.0..0.6)).min(119.0);
            profile.dependency = (profile.dependency + rng.gen_range(-1.0..1.5)).max(0.0);
            profile.participation =
                (profile.participation + rng.gen_range(-1.0..1.0)).clamp(0.0, 100.0);
            profile.unemployment =
                (profile.unemployment + rng.gen_range(-0.5..0.5)).clamp(0.0, 100.0);
            profile.poverty = (profile.poverty + rng.gen_range(-0.5..0.5)).clamp(0.0, 100.0);
            profile.income = (profile.income * rng.gen_range(0.99..1.03)).max(0.0);
        }
    }

    DataFrame::new(vec![
        Column::new(MUNICIPALITY_ID.into(), ids),
        Column::new(PERIOD.into(), periods),
        Column::new(POPULATION.into(), population),
        Column::new(FERTILITY_RATE.into(), fertility),
        Column::new(MEDIAN_AGE.into(), median_age),
        Column::new(AGE_DEPENDENCY_RATIO.into(), dependency),
        Column::new(LABOR_FORCE_PARTICIPATION.into(), participation),
        Column::new(UNEMPLOYMENT_RATE.into(), unemployment),
        Column::new(POVERTY_RATE.into(), poverty),
        Column::new(MEDIAN_HOUSEHOLD_INCOME.into(), income),
        Column::new(HURRICANE_EXPOSURE.into(), hurricane),
        Column::new(EARTHQUAKE_EXPOSURE.into(), earthquake),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape() {
        let config = SyntheticConfig {
            municipalities: 4,
            periods: 3,
            ..Default::default()
        };
        let df = generate(&config).unwrap();
        assert_eq!(df.height(), 12);
        assert_eq!(df.width(), 12);
    }

    #[test]
    fn test_deterministic() {
        let config = SyntheticConfig::default();
        let a = generate(&config).unwrap();
        let b = generate(&config).unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn test_expected_change_signs() {
        assert!(expected_change(2.0, 0.0, 45.0) < 0.0);
        assert!(expected_change(0.0, 1.0, 45.0) > 0.0);
    }
}
