//! CART regression trees
//!
//! Greedy binary splits minimizing the summed squared error of the two
//! children. A row goes left when its value is `<= threshold`; thresholds
//! sit halfway between adjacent distinct values. Ties between equally good
//! splits keep the first one found (lowest feature index, then lowest
//! threshold), so growth is deterministic for a fixed feature draw.

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Minimum SSE reduction for a split to be kept
const MIN_GAIN: f64 = 1e-12;

/// One node of a fitted tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    /// Terminal node
    Leaf {
        /// Mean target of the training rows in the leaf
        value: f64,
    },
    /// Internal node
    Split {
        /// Feature index
        feature: usize,
        /// Rows with `value <= threshold` go left
        threshold: f64,
        /// Index of the left child
        left: usize,
        /// Index of the right child
        right: usize,
    },
}

/// Fitted regression tree, stored as a flat node list rooted at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Nodes in creation order
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Prediction for one feature row
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// Growth limits for one tree
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeConfig {
    pub(crate) max_depth: usize,
    pub(crate) min_samples_leaf: usize,
    /// Features drawn at each split (`None` = all)
    pub(crate) max_features: Option<usize>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Grower<'a, 'x, 'y> {
    x: ArrayView2<'x, f64>,
    y: ArrayView1<'y, f64>,
    config: TreeConfig,
    rng: Option<&'a mut StdRng>,
    nodes: Vec<TreeNode>,
}

impl Grower<'_, '_, '_> {
    fn grow(&mut self, rows: &[usize], depth: usize) -> usize {
        let index = self.nodes.len();
        let value = rows.iter().map(|&r| self.y[r]).sum::<f64>() / rows.len() as f64;
        self.nodes.push(TreeNode::Leaf { value });

        if depth >= self.config.max_depth {
            return index;
        }
        let Some(split) = self.best_split(rows) else {
            return index;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&r| self.x[[r, split.feature]] <= split.threshold);
        let left = self.grow(&left_rows, depth + 1);
        let right = self.grow(&right_rows, depth + 1);
        self.nodes[index] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let p = self.x.ncols();
        let mut features: Vec<usize> = (0..p).collect();
        if let (Some(m), Some(rng)) = (self.config.max_features, self.rng.as_deref_mut()) {
            if m < p {
                let (chosen, _) = features.partial_shuffle(rng, m);
                let mut chosen = chosen.to_vec();
                chosen.sort_unstable();
                return chosen;
            }
        }
        features
    }

    fn best_split(&mut self, rows: &[usize]) -> Option<Candidate> {
        let n = rows.len();
        let min_leaf = self.config.min_samples_leaf;
        if n < 2 * min_leaf {
            return None;
        }

        let total: f64 = rows.iter().map(|&r| self.y[r]).sum();
        let parent = total * total / n as f64;
        let mut best: Option<Candidate> = None;

        for feature in self.candidate_features() {
            let mut order = rows.to_vec();
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left_sum = 0.0;
            for i in 0..n - 1 {
                left_sum += self.y[order[i]];
                let left_n = i + 1;
                let right_n = n - left_n;
                if left_n < min_leaf {
                    continue;
                }
                if right_n < min_leaf {
                    break;
                }
                let here = self.x[[order[i], feature]];
                let next = self.x[[order[i + 1], feature]];
                if here == next {
                    continue;
                }

                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64
                    - parent;
                if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(Candidate {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Grow a tree on the given rows (repeats allowed, as in a bootstrap sample)
pub(crate) fn grow(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    rows: &[usize],
    config: &TreeConfig,
    rng: Option<&mut StdRng>,
) -> RegressionTree {
    let mut grower = Grower {
        x,
        y,
        config: *config,
        rng,
        nodes: Vec::new(),
    };
    grower.grow(rows, 0);
    RegressionTree {
        nodes: grower.nodes,
    }
}
