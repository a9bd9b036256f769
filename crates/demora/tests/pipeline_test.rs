//! End-to-end pipeline runs on synthetic tables

use demora::data::synthetic::{self, SyntheticConfig};
use demora::forecast::ModelVariant;
use demora::output::ExportFormat;
use demora::{Pipeline, PipelineConfig, PipelineError};
use polars::prelude::DataFrame;

fn inputs() -> DataFrame {
    synthetic::generate(&SyntheticConfig {
        municipalities: 20,
        periods: 6,
        ..Default::default()
    })
    .unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig {
        model_variants: vec![
            ModelVariant::MeanBaseline,
            ModelVariant::Linear,
            ModelVariant::Ridge { alpha: 1.0 },
            ModelVariant::RandomForest {
                n_estimators: 10,
                max_depth: 4,
                min_samples_leaf: 2,
                max_features: 3,
                seed: 3,
            },
        ],
        k: 3,
        resamples: 5,
        importance_repetitions: 3,
        ..PipelineConfig::example()
    }
}

#[test]
fn test_full_run() {
    let output = Pipeline::new(config()).unwrap().run(&inputs()).unwrap();

    // 2010 lacks its lag, 2015 lacks its target
    assert_eq!(output.scoring_period, 2015);
    assert_eq!(output.model.training_rows(), 20 * 4);

    let best = output.comparison.best().unwrap();
    assert_eq!(output.model.variant(), &best.variant);
    assert_ne!(best.variant, ModelVariant::MeanBaseline);

    assert_eq!(output.importance.features.len(), output.model.feature_names().len());
    assert_eq!(output.clusters.labels.len(), 20);
    assert_eq!(output.clusters.period, 2015);
    assert_eq!(output.stability.scores.len(), 5);

    assert_eq!(output.scores.len(), 20);
    for score in output.scores.scores.values() {
        assert!((0.0..=1.0).contains(&score.score));
        assert_eq!(score.period, 2015);
        assert_eq!(
            Some(score.cluster_label),
            output.clusters.label_of(&score.municipality_id)
        );
    }
    assert!(!output.training_exclusions.is_empty());
}

#[test]
fn test_run_is_reproducible() {
    let pipeline = Pipeline::new(config()).unwrap();
    let data = inputs();
    let first = pipeline.run(&data).unwrap();
    let second = pipeline.run(&data).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_explicit_scoring_period_and_reference_periods() {
    let config = PipelineConfig {
        reference_periods: vec![2011, 2012],
        scoring_period: Some(2013),
        ..config()
    };
    let output = Pipeline::new(config).unwrap().run(&inputs()).unwrap();
    assert_eq!(output.scoring_period, 2013);
    assert_eq!(output.model.training_rows(), 40);
    assert!(output.scores.scores.values().all(|s| s.period == 2013));
}

#[test]
fn test_invalid_config_fails_before_running() {
    let config = PipelineConfig {
        folds: 1,
        ..config()
    };
    assert!(matches!(
        Pipeline::new(config),
        Err(PipelineError::Configuration(_))
    ));
}

#[test]
fn test_export_bundle() {
    let output = Pipeline::new(config()).unwrap().run(&inputs()).unwrap();
    let exclusions = output.exclusions();
    let dir = std::env::temp_dir().join("demora_pipeline_export_test");

    let written = output
        .bundle(&exclusions)
        .write_to_dir(&dir, ExportFormat::Csv)
        .unwrap();
    assert_eq!(written.len(), 7);
    let scores = std::fs::read_to_string(dir.join("scores.csv")).unwrap();
    assert!(scores.starts_with("rank,municipality_id,period,score,"));
    assert_eq!(scores.lines().count(), 21);

    let json = serde_json::to_string(&output).unwrap();
    assert!(json.contains("\"scoring_period\":2015"));

    std::fs::remove_dir_all(dir).ok();
}
