//! Typology scenarios on synthetic municipal profiles

use demora_data::{FeatureMatrix, FeatureSchema, ObservationKey, SeedSequence};
use demora_typology::{
    AgreementMetric, ClusterAlgorithm, Linkage, Perturbation, StabilityConfig, TypologyEngine,
};
use ndarray::Array2;
use rand::Rng;
use rstest::rstest;

const FEATURES: [&str; 2] = ["median_age", "poverty_rate"];

/// Three well-separated profiles of 8 municipalities each, in the given row order
fn profiles(order: &[usize]) -> FeatureMatrix {
    let mut rng = SeedSequence::new(5).rng("profiles", 0);
    let centers = [(32.0, 35.0), (45.0, 50.0), (38.0, 62.0)];
    let rows: Vec<(String, f64, f64)> = (0..24)
        .map(|i| {
            let (age, poverty) = centers[i / 8];
            (
                format!("muni-{i:02}"),
                age + rng.gen_range(-0.5..0.5),
                poverty + rng.gen_range(-0.5..0.5),
            )
        })
        .collect();

    let keys = order
        .iter()
        .map(|&i| ObservationKey::new(rows[i].0.clone(), 2020))
        .collect();
    let values: Vec<f64> = order.iter().flat_map(|&i| [rows[i].1, rows[i].2]).collect();
    FeatureMatrix::new(
        FeatureSchema::unbounded(&FEATURES),
        keys,
        Array2::from_shape_vec((order.len(), 2), values).unwrap(),
        None,
    )
    .unwrap()
}

/// Structureless uniform noise
fn noise(n: usize) -> FeatureMatrix {
    let mut rng = SeedSequence::new(99).rng("noise", 0);
    let keys = (0..n)
        .map(|i| ObservationKey::new(format!("muni-{i:02}"), 2020))
        .collect();
    let values: Vec<f64> = (0..2 * n).map(|_| rng.gen_range(0.0..1.0)).collect();
    FeatureMatrix::new(
        FeatureSchema::unbounded(&FEATURES),
        keys,
        Array2::from_shape_vec((n, 2), values).unwrap(),
        None,
    )
    .unwrap()
}

#[rstest]
#[case(ClusterAlgorithm::KMeans { restarts: 5, max_iterations: 100 })]
#[case(ClusterAlgorithm::Hierarchical { linkage: Linkage::Ward })]
#[case(ClusterAlgorithm::Hierarchical { linkage: Linkage::Average })]
#[case(ClusterAlgorithm::Hierarchical { linkage: Linkage::Complete })]
fn test_clustering_is_invariant_to_row_order(#[case] algorithm: ClusterAlgorithm) {
    let forward: Vec<usize> = (0..24).collect();
    let shuffled: Vec<usize> = (0..24).map(|i| (i * 7) % 24).collect();
    let reversed: Vec<usize> = (0..24).rev().collect();

    let engine = TypologyEngine::new(11);
    let reference = engine
        .cluster(&profiles(&forward), &FEATURES, 3, &algorithm)
        .unwrap();
    for order in [shuffled, reversed] {
        let other = engine
            .cluster(&profiles(&order), &FEATURES, 3, &algorithm)
            .unwrap();
        assert_eq!(reference.labels, other.labels);
        assert_eq!(reference.centroids, other.centroids);
    }

    // Profiles are recovered and labelled in id order
    assert_eq!(reference.sizes, vec![8, 8, 8]);
    assert_eq!(reference.label_of("muni-00"), Some(0));
    assert_eq!(reference.label_of("muni-08"), Some(1));
    assert_eq!(reference.label_of("muni-16"), Some(2));
}

#[rstest]
#[case(AgreementMetric::AdjustedRand)]
#[case(AgreementMetric::Rand)]
#[case(AgreementMetric::FowlkesMallows)]
fn test_separated_profiles_are_stable(#[case] metric: AgreementMetric) {
    let engine = TypologyEngine::new(3).with_stability(StabilityConfig {
        perturbation: Perturbation::Bootstrap,
        metric,
        unstable_threshold: 0.6,
    });
    let forward: Vec<usize> = (0..24).collect();
    let report = engine
        .assess_stability(
            &profiles(&forward),
            &FEATURES,
            3,
            &ClusterAlgorithm::KMeans {
                restarts: 5,
                max_iterations: 100,
            },
            12,
        )
        .unwrap();

    assert_eq!(report.scores.len(), 12);
    assert!(report.mean.unwrap() > 0.95);
    assert!(!report.is_unstable());
}

#[test]
fn test_noise_is_flagged_unstable_but_not_an_error() {
    let engine = TypologyEngine::new(3).with_stability(StabilityConfig {
        perturbation: Perturbation::Bootstrap,
        metric: AgreementMetric::AdjustedRand,
        unstable_threshold: 0.99,
    });
    let report = engine
        .assess_stability(
            &noise(30),
            &FEATURES,
            5,
            &ClusterAlgorithm::Hierarchical {
                linkage: Linkage::Average,
            },
            10,
        )
        .unwrap();
    assert!(report.mean.is_some());
    assert!(report.is_unstable());
}

#[test]
fn test_stability_is_reproducible() {
    let engine = TypologyEngine::new(21);
    let algorithm = ClusterAlgorithm::default();
    let a = engine.assess_stability(&noise(20), &FEATURES, 3, &algorithm, 6).unwrap();
    let b = engine.assess_stability(&noise(20), &FEATURES, 3, &algorithm, 6).unwrap();
    assert_eq!(a, b);
}
