//! K-means clustering
//!
//! Each restart seeds its centroids with k-means++ from its own stream, then
//! runs Lloyd iterations until the assignment stops changing or the
//! iteration limit is reached. The restart with the lowest within-cluster
//! sum of squares wins; ties go to the earliest restart.

use demora_data::SeedSequence;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::debug;

/// Result of one k-means solution
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// Cluster index per row
    pub labels: Vec<usize>,
    /// Centroids (k x features)
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squared distances
    pub inertia: f64,
    /// Lloyd iterations performed
    pub iterations: usize,
}

/// Best of `restarts` k-means runs
///
/// `data` must have at least `k` rows; callers validate this.
pub fn kmeans(
    data: ArrayView2<'_, f64>,
    k: usize,
    restarts: usize,
    max_iterations: usize,
    seeds: &SeedSequence,
) -> KMeansFit {
    let fits: Vec<KMeansFit> = (0..restarts.max(1))
        .into_par_iter()
        .map(|restart| {
            let mut rng = seeds.rng("kmeans-restart", restart as u64);
            lloyd(data, k, max_iterations, &mut rng)
        })
        .collect();

    let mut best = 0;
    for (i, fit) in fits.iter().enumerate() {
        if fit.inertia < fits[best].inertia {
            best = i;
        }
    }
    debug!(
        k,
        restarts,
        best_restart = best,
        inertia = fits[best].inertia,
        "k-means finished"
    );
    fits.into_iter().nth(best).unwrap_or_else(|| KMeansFit {
        labels: vec![0; data.nrows()],
        centroids: Array2::zeros((k, data.ncols())),
        inertia: f64::INFINITY,
        iterations: 0,
    })
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index and squared distance of the nearest centroid (ties go to the lowest index)
fn nearest(row: ArrayView1<'_, f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.axis_iter(Axis(0)).enumerate() {
        let d = squared_distance(row, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// k-means++ seeding
fn initial_centroids(data: ArrayView2<'_, f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let mut centroids = Array2::<f64>::zeros((k, data.ncols()));
    let first = rng.gen_range(0..n);
    centroids.row_mut(0).assign(&data.row(first));

    let mut closest: Vec<f64> = data
        .axis_iter(Axis(0))
        .map(|row| squared_distance(row, data.row(first)))
        .collect();

    for c in 1..k {
        let total: f64 = closest.iter().sum();
        let chosen = if total > 0.0 {
            let mut draw = rng.gen_range(0.0..total);
            let mut pick = n - 1;
            for (i, &d) in closest.iter().enumerate() {
                if draw < d {
                    pick = i;
                    break;
                }
                draw -= d;
            }
            pick
        } else {
            rng.gen_range(0..n)
        };
        centroids.row_mut(c).assign(&data.row(chosen));
        for (i, row) in data.axis_iter(Axis(0)).enumerate() {
            closest[i] = closest[i].min(squared_distance(row, data.row(chosen)));
        }
    }
    centroids
}

fn lloyd(
    data: ArrayView2<'_, f64>,
    k: usize,
    max_iterations: usize,
    rng: &mut StdRng,
) -> KMeansFit {
    let n = data.nrows();
    let mut centroids = initial_centroids(data, k, rng);
    let mut labels = vec![usize::MAX; n];
    let mut iterations = 0;
    let mut converged = false;

    for _ in 0..max_iterations {
        iterations += 1;
        let mut changed = false;
        for (i, row) in data.axis_iter(Axis(0)).enumerate() {
            let (c, _) = nearest(row, &centroids);
            if labels[i] != c {
                labels[i] = c;
                changed = true;
            }
        }
        if !changed {
            converged = true;
            break;
        }
        update_centroids(data, &mut labels, &mut centroids);
    }

    // Out of iterations: the last update moved the centroids after labelling
    if !converged {
        for (label, row) in labels.iter_mut().zip(data.axis_iter(Axis(0))) {
            *label = nearest(row, &centroids).0;
        }
    }

    let inertia = data
        .axis_iter(Axis(0))
        .zip(&labels)
        .map(|(row, &c)| squared_distance(row, centroids.row(c)))
        .sum();

    KMeansFit {
        labels,
        centroids,
        inertia,
        iterations,
    }
}

/// Recompute centroids as member means; an empty cluster takes over the row
/// farthest from its current centroid
fn update_centroids(data: ArrayView2<'_, f64>, labels: &mut [usize], centroids: &mut Array2<f64>) {
    let k = centroids.nrows();
    let mut sums = Array2::<f64>::zeros(centroids.raw_dim());
    let mut counts = vec![0usize; k];
    for (row, &c) in data.axis_iter(Axis(0)).zip(labels.iter()) {
        sums.row_mut(c).scaled_add(1.0, &row);
        counts[c] += 1;
    }

    for c in 0..k {
        if counts[c] > 0 {
            let mean = sums.row(c).mapv(|v| v / counts[c] as f64);
            centroids.row_mut(c).assign(&mean);
            continue;
        }
        let farthest = data
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(i, _)| counts[labels[*i]] > 1)
            .map(|(i, row)| (i, squared_distance(row, centroids.row(labels[i]))))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((i, d)),
            });
        if let Some((i, _)) = farthest {
            counts[labels[i]] -= 1;
            labels[i] = c;
            counts[c] = 1;
            centroids.row_mut(c).assign(&data.row(i));
        }
    }
}

/// Centroids and inertia of an arbitrary labelling
pub fn centroids_and_inertia(
    data: ArrayView2<'_, f64>,
    labels: &[usize],
    k: usize,
) -> (Array2<f64>, f64) {
    let mut centroids = Array2::<f64>::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];
    for (row, &c) in data.axis_iter(Axis(0)).zip(labels) {
        centroids.row_mut(c).scaled_add(1.0, &row);
        counts[c] += 1;
    }
    for (c, count) in counts.iter().enumerate() {
        if *count > 0 {
            centroids.row_mut(c).mapv_inplace(|v| v / *count as f64);
        }
    }
    let inertia = data
        .axis_iter(Axis(0))
        .zip(labels)
        .map(|(row, &c)| squared_distance(row, centroids.row(c)))
        .sum();
    (centroids, inertia)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rstest::rstest;

    fn blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.2],
            [0.2, 0.1],
            [5.0, 5.0],
            [5.1, 4.9],
            [4.9, 5.2],
            [10.0, 0.0],
            [10.2, 0.1],
        ]
    }

    #[test]
    fn test_separates_blobs() {
        let data = blobs();
        let fit = kmeans(data.view(), 3, 5, 100, &SeedSequence::new(1));
        assert_eq!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.labels[1], fit.labels[2]);
        assert_eq!(fit.labels[3], fit.labels[4]);
        assert_eq!(fit.labels[4], fit.labels[5]);
        assert_eq!(fit.labels[6], fit.labels[7]);
        assert_ne!(fit.labels[0], fit.labels[3]);
        assert_ne!(fit.labels[3], fit.labels[6]);
        assert_ne!(fit.labels[0], fit.labels[6]);
    }

    #[test]
    fn test_restarts_are_reproducible() {
        let data = blobs();
        let a = kmeans(data.view(), 2, 4, 50, &SeedSequence::new(8));
        let b = kmeans(data.view(), 2, 4, 50, &SeedSequence::new(8));
        assert_eq!(a, b);
    }

    #[test]
    fn test_centroids_and_inertia() {
        let data = array![[0.0], [2.0], [10.0]];
        let (centroids, inertia) = centroids_and_inertia(data.view(), &[0, 0, 1], 2);
        assert_abs_diff_eq!(centroids[[0, 0]], 1.0);
        assert_abs_diff_eq!(centroids[[1, 0]], 10.0);
        assert_abs_diff_eq!(inertia, 2.0);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    fn test_iteration_limit_keeps_labels_nearest(#[case] max_iterations: usize) {
        let data = blobs();
        let fit = kmeans(data.view(), 3, 3, max_iterations, &SeedSequence::new(4));
        let mut expected_inertia = 0.0;
        for (row, &label) in data.axis_iter(Axis(0)).zip(&fit.labels) {
            let (c, d) = nearest(row, &fit.centroids);
            assert_eq!(label, c);
            expected_inertia += d;
        }
        assert_abs_diff_eq!(fit.inertia, expected_inertia, epsilon = 1e-12);
    }

    #[test]
    fn test_duplicate_points_do_not_panic() {
        let data = array![[1.0], [1.0], [1.0], [1.0]];
        let fit = kmeans(data.view(), 2, 2, 10, &SeedSequence::new(0));
        assert_eq!(fit.labels.len(), 4);
        assert_abs_diff_eq!(fit.inertia, 0.0);
    }
}
