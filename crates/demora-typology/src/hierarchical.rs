//! Agglomerative hierarchical clustering
//!
//! Starts from singletons and repeatedly merges the closest pair of clusters,
//! updating distances with the Lance-Williams recurrence, until `k` clusters
//! remain. Ward linkage works on squared Euclidean distances; average and
//! complete linkage on Euclidean distances. Ties merge the pair with the
//! lowest indices first.

use crate::assignment::Linkage;
use ndarray::{Array2, ArrayView2};
use tracing::debug;

/// Cluster index per row, numbered by each cluster's lowest row index
pub fn agglomerate(data: ArrayView2<'_, f64>, k: usize, linkage: Linkage) -> Vec<usize> {
    let n = data.nrows();
    let mut distance = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let squared: f64 = data
                .row(i)
                .iter()
                .zip(data.row(j).iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            let d = match linkage {
                Linkage::Ward => squared,
                Linkage::Average | Linkage::Complete => squared.sqrt(),
            };
            distance[[i, j]] = d;
            distance[[j, i]] = d;
        }
    }

    // Cluster `i` is represented by its lowest member row
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut active: Vec<bool> = vec![true; n];
    let mut remaining = n;

    while remaining > k.max(1) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if active[j] && best.is_none_or(|(_, _, d)| distance[[i, j]] < d) {
                    best = Some((i, j, distance[[i, j]]));
                }
            }
        }
        let Some((i, j, d_ij)) = best else {
            break;
        };

        let n_i = members[i].len() as f64;
        let n_j = members[j].len() as f64;
        for m in 0..n {
            if !active[m] || m == i || m == j {
                continue;
            }
            let n_m = members[m].len() as f64;
            let d_im = distance[[i, m]];
            let d_jm = distance[[j, m]];
            let updated = match linkage {
                Linkage::Ward => {
                    ((n_i + n_m) * d_im + (n_j + n_m) * d_jm - n_m * d_ij) / (n_i + n_j + n_m)
                }
                Linkage::Average => (n_i * d_im + n_j * d_jm) / (n_i + n_j),
                Linkage::Complete => d_im.max(d_jm),
            };
            distance[[i, m]] = updated;
            distance[[m, i]] = updated;
        }

        let absorbed = std::mem::take(&mut members[j]);
        members[i].extend(absorbed);
        active[j] = false;
        remaining -= 1;
    }

    let mut labels = vec![0; n];
    for (label, i) in (0..n).filter(|&i| active[i]).enumerate() {
        for &row in &members[i] {
            labels[row] = label;
        }
    }
    debug!(k, rows = n, ?linkage, "hierarchical clustering finished");
    labels
}
