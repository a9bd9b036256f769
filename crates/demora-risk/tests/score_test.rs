//! End-to-end scoring on a synthetic panel

use approx::assert_abs_diff_eq;
use demora_data::synthetic::{self, SyntheticConfig};
use demora_data::{BuildConfig, FeatureMatrixBuilder, TargetMode, Warning};
use demora_forecast::{ForecastingEngine, ModelVariant};
use demora_risk::{
    IndicatorSpec, Normalization, RiskSource, ScorerConfig, ScoringError, ScoringWeights,
    VulnerabilityScorer,
};
use demora_typology::{ClusterAlgorithm, TypologyEngine};
use rstest::rstest;

const SCORING_PERIOD: i32 = 2014;

struct Fixture {
    scoring: demora_data::FeatureMatrix,
    fitted: demora_forecast::FittedModel,
    clusters: demora_typology::ClusterAssignment,
}

fn fixture() -> Fixture {
    let table = synthetic::generate(&SyntheticConfig {
        municipalities: 16,
        periods: 5,
        ..Default::default()
    })
    .unwrap();
    let builder = FeatureMatrixBuilder::default();
    let training = builder
        .build(&table, &BuildConfig::training(1, vec![]))
        .unwrap()
        .matrix;
    let scoring = builder
        .build(
            &table,
            &BuildConfig::training(1, vec![]).with_target(TargetMode::WhereAvailable),
        )
        .unwrap()
        .matrix;

    let fitted = ForecastingEngine::new(11)
        .fit(&training, &ModelVariant::Ridge { alpha: 1.0 })
        .unwrap();
    let clusters = TypologyEngine::new(11)
        .cluster(
            &scoring.for_period(SCORING_PERIOD).unwrap(),
            &["fertility_rate", "median_age", "poverty_rate"],
            3,
            &ClusterAlgorithm::default(),
        )
        .unwrap();

    Fixture {
        scoring,
        fitted,
        clusters,
    }
}

#[rstest]
#[case(Normalization::MinMax)]
#[case(Normalization::Rank)]
fn test_scores_are_bounded_and_auditable(#[case] normalization: Normalization) {
    let f = fixture();
    let scorer = VulnerabilityScorer::new(ScorerConfig {
        normalization,
        ..Default::default()
    });
    let weights = ScoringWeights::default();
    let sheet = scorer
        .score(SCORING_PERIOD, &f.scoring, &f.fitted, &f.clusters, &weights)
        .unwrap();

    assert_eq!(sheet.len(), 16);
    for score in sheet.scores.values() {
        assert!((0.0..=1.0).contains(&score.score));
        assert_abs_diff_eq!(score.contributions.total(), score.score, epsilon = 1e-12);
        assert_abs_diff_eq!(
            score.contributions.forecast,
            weights.forecast * score.components.forecast,
            epsilon = 1e-12
        );
        assert_eq!(
            Some(score.cluster_label),
            f.clusters.label_of(&score.municipality_id)
        );
    }

    // History exists for every cluster, so no fallback is needed
    assert!(
        sheet
            .cluster_risk
            .iter()
            .all(|c| c.source == RiskSource::History && c.rows > 0)
    );
    assert!(
        !sheet
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::ClusterRiskFromPredictions { .. }))
    );

    let ranked = sheet.ranked();
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_scoring_is_reproducible() {
    let f = fixture();
    let scorer = VulnerabilityScorer::default();
    let weights = ScoringWeights::new(0.2, 0.2, 0.6);
    let first = scorer
        .score(SCORING_PERIOD, &f.scoring, &f.fitted, &f.clusters, &weights)
        .unwrap();
    let second = scorer
        .score(SCORING_PERIOD, &f.scoring, &f.fitted, &f.clusters, &weights)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_weights_validated_before_scoring() {
    let f = fixture();
    let scorer = VulnerabilityScorer::default();
    let rejected = scorer.score(
        SCORING_PERIOD,
        &f.scoring,
        &f.fitted,
        &f.clusters,
        &ScoringWeights::new(0.5, 0.5, 0.2),
    );
    assert!(matches!(rejected, Err(ScoringError::Configuration(_))));

    let accepted = scorer.score(
        SCORING_PERIOD,
        &f.scoring,
        &f.fitted,
        &f.clusters,
        &ScoringWeights::new(0.4, 0.3, 0.3),
    );
    assert!(accepted.is_ok());
}

#[test]
fn test_unknown_indicator_rejected() {
    let f = fixture();
    let scorer = VulnerabilityScorer::new(ScorerConfig {
        indicators: vec![IndicatorSpec::higher("rainfall", 1.0)],
        ..Default::default()
    });
    let result = scorer.score(
        SCORING_PERIOD,
        &f.scoring,
        &f.fitted,
        &f.clusters,
        &ScoringWeights::default(),
    );
    assert!(matches!(result, Err(ScoringError::Configuration(_))));
}
