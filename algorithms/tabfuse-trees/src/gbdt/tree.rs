//! Leaf-wise regression trees on gradient statistics

use ndarray::{ArrayBase, Data, Ix1};
use rayon::ThreadPool;
use tabfuse::Float;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use super::binning::{BinMapper, BinnedMatrix};
use super::histogram::{BinStats, Histogram};
use super::hyperparams::GbdtValidParams;

/// L1 soft thresholding of a gradient sum
fn threshold_l1(g: f64, alpha: f64) -> f64 {
    g.signum() * (g.abs() - alpha).max(0.0)
}

fn leaf_gain(g: f64, h: f64, alpha: f64, lambda: f64) -> f64 {
    let t = threshold_l1(g, alpha);
    t * t / (h + lambda)
}

fn leaf_output(g: f64, h: f64, alpha: f64, lambda: f64) -> f64 {
    -threshold_l1(g, alpha) / (h + lambda)
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
/// A node of a boosted tree
///
/// Samples with `x[feature] <= threshold` go to the left child.
pub enum TreeNode<F> {
    Split {
        feature: usize,
        threshold: F,
        gain: F,
        left: usize,
        right: usize,
    },
    Leaf {
        value: F,
    },
}

/// A regression tree fitted to the gradients of one boosting round
///
/// Leaf values already include the learning rate.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct Tree<F> {
    nodes: Vec<TreeNode<F>>,
}

impl<F: Float> Tree<F> {
    pub fn nodes(&self) -> &[TreeNode<F>] {
        &self.nodes
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }

    /// Raw score contribution for one sample
    pub fn predict_row<D: Data<Elem = F>>(&self, row: &ArrayBase<D, Ix1>) -> F {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Total split gain per feature
    pub fn feature_gains(&self, nfeatures: usize) -> Vec<F> {
        let mut gains = vec![F::zero(); nfeatures];
        for node in &self.nodes {
            if let TreeNode::Split { feature, gain, .. } = node {
                gains[*feature] += *gain;
            }
        }
        gains
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitInfo {
    feature: usize,
    bin: usize,
    gain: f64,
    left: BinStats,
    right: BinStats,
}

/// A leaf that may still be split
struct LeafCandidate {
    node: usize,
    depth: usize,
    rows: Vec<usize>,
    hist: Histogram,
    total: BinStats,
    split: Option<SplitInfo>,
}

/// Grows trees leaf by leaf, always splitting the leaf with the largest gain
pub(crate) struct TreeLearner<'a, F> {
    params: &'a GbdtValidParams,
    binned: &'a BinnedMatrix,
    mappers: &'a [BinMapper<F>],
    pool: &'a ThreadPool,
}

impl<'a, F: Float> TreeLearner<'a, F> {
    pub(crate) fn new(
        params: &'a GbdtValidParams,
        binned: &'a BinnedMatrix,
        mappers: &'a [BinMapper<F>],
        pool: &'a ThreadPool,
    ) -> Self {
        TreeLearner {
            params,
            binned,
            mappers,
            pool,
        }
    }

    fn best_split(&self, hist: &Histogram, total: &BinStats, depth: usize) -> Option<SplitInfo> {
        let p = self.params;
        if total.count < 2 * p.min_data_in_leaf() {
            return None;
        }
        if let Some(max_depth) = p.max_depth() {
            if depth >= max_depth {
                return None;
            }
        }

        let (alpha, lambda) = (p.reg_alpha(), p.reg_lambda());
        let parent_gain = leaf_gain(total.grad, total.hess, alpha, lambda);
        let mut best: Option<SplitInfo> = None;

        for feature in 0..self.binned.nfeatures() {
            let bins = hist.feature(feature);
            let mut left = BinStats::default();
            // the last bin can never be the left side of a split
            for (bin, stats) in bins.iter().enumerate().take(bins.len().saturating_sub(1)) {
                left.grad += stats.grad;
                left.hess += stats.hess;
                left.count += stats.count;

                let right = BinStats {
                    grad: total.grad - left.grad,
                    hess: total.hess - left.hess,
                    count: total.count - left.count,
                };
                if left.count < p.min_data_in_leaf() || left.hess < p.min_sum_hessian_in_leaf() {
                    continue;
                }
                if right.count < p.min_data_in_leaf() || right.hess < p.min_sum_hessian_in_leaf() {
                    break;
                }

                let gain = leaf_gain(left.grad, left.hess, alpha, lambda)
                    + leaf_gain(right.grad, right.hess, alpha, lambda)
                    - parent_gain;
                if gain > 0.0 && best.map(|b| gain > b.gain).unwrap_or(true) {
                    best = Some(SplitInfo {
                        feature,
                        bin,
                        gain,
                        left,
                        right,
                    });
                }
            }
        }

        best
    }

    fn candidate(
        &self,
        node: usize,
        depth: usize,
        rows: Vec<usize>,
        hist: Histogram,
        total: BinStats,
    ) -> LeafCandidate {
        let split = self.best_split(&hist, &total, depth);
        LeafCandidate {
            node,
            depth,
            rows,
            hist,
            total,
            split,
        }
    }

    /// Fits one tree on `rows` and returns it together with the rows of every leaf node
    pub(crate) fn grow(
        &self,
        rows: Vec<usize>,
        grad: &[f64],
        hess: &[f64],
    ) -> (Tree<F>, Vec<(usize, Vec<usize>)>) {
        let p = self.params;
        let root_hist = Histogram::build(self.binned, &rows, grad, hess, self.pool);
        let total = rows.iter().fold(BinStats::default(), |mut acc, &row| {
            acc.grad += grad[row];
            acc.hess += hess[row];
            acc.count += 1;
            acc
        });

        let mut nodes = vec![TreeNode::Leaf { value: F::zero() }];
        let mut leaves = vec![self.candidate(0, 0, rows, root_hist, total)];

        while leaves.len() < p.num_leaves() {
            let next = leaves
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.split.map(|s| (i, s)))
                .max_by(|a, b| a.1.gain.partial_cmp(&b.1.gain).unwrap_or(std::cmp::Ordering::Equal));
            let (idx, split) = match next {
                Some(next) => next,
                None => break,
            };
            let leaf = leaves.swap_remove(idx);

            let column = self.binned.column(split.feature);
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .into_iter()
                .partition(|row| (column[*row] as usize) <= split.bin);

            // build the smaller child, derive the larger one from the parent
            let (left_hist, right_hist) = if left_rows.len() <= right_rows.len() {
                let small = Histogram::build(self.binned, &left_rows, grad, hess, self.pool);
                let large = small.subtract_from(&leaf.hist);
                (small, large)
            } else {
                let small = Histogram::build(self.binned, &right_rows, grad, hess, self.pool);
                let large = small.subtract_from(&leaf.hist);
                (large, small)
            };

            let (left, right) = (nodes.len(), nodes.len() + 1);
            nodes[leaf.node] = TreeNode::Split {
                feature: split.feature,
                threshold: self.mappers[split.feature].upper_bound(split.bin),
                gain: F::cast(split.gain),
                left,
                right,
            };
            nodes.push(TreeNode::Leaf { value: F::zero() });
            nodes.push(TreeNode::Leaf { value: F::zero() });

            leaves.push(self.candidate(left, leaf.depth + 1, left_rows, left_hist, split.left));
            leaves.push(self.candidate(right, leaf.depth + 1, right_rows, right_hist, split.right));
        }

        let leaves = leaves
            .into_iter()
            .map(|leaf| {
                let value = leaf_output(leaf.total.grad, leaf.total.hess, p.reg_alpha(), p.reg_lambda())
                    * p.learning_rate();
                nodes[leaf.node] = TreeNode::Leaf {
                    value: F::cast(value),
                };
                (leaf.node, leaf.rows)
            })
            .collect::<Vec<_>>();

        (Tree { nodes }, leaves)
    }
}

/// Value of the leaf `node` in `tree`
pub(crate) fn leaf_value<F: Float>(tree: &Tree<F>, node: usize) -> F {
    match tree.nodes[node] {
        TreeNode::Leaf { value } => value,
        TreeNode::Split { .. } => F::zero(),
    }
}
