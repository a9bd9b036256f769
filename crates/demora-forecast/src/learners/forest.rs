//! Random forests
//!
//! Each tree is grown on a bootstrap sample with per-split feature
//! subsampling. Tree `t` draws from its own stream of the variant's seed, so
//! the forest does not depend on how rayon schedules the trees.

use super::tree::{self, RegressionTree, TreeConfig};
use demora_data::SeedSequence;
use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use rayon::prelude::*;
use tracing::debug;

/// Grow `n_estimators` trees in parallel
pub(crate) fn fit_forest(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    n_estimators: usize,
    config: &TreeConfig,
    seed: u64,
) -> Vec<RegressionTree> {
    let seeds = SeedSequence::new(seed);
    let n = x.nrows();

    let trees: Vec<RegressionTree> = (0..n_estimators)
        .into_par_iter()
        .map(|t| {
            let mut rng = seeds.rng("forest-tree", t as u64);
            let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            tree::grow(x, y, &rows, config, Some(&mut rng))
        })
        .collect();

    debug!(trees = trees.len(), rows = n, "grew random forest");
    trees
}
