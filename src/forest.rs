//! CART regression trees and an averaging forest.
//!
//! Trees split on variance reduction; leaves predict the mean target of
//! the training rows that reach them. The impurity decrease of every split
//! is credited to its feature, which yields the forest's importances.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::TrainError;
use crate::preprocess::{FeatureVector, N_FEATURES};

/// Hyper-parameters of the tree ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fit each tree on a seeded bootstrap sample instead of the full partition.
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: false,
        }
    }
}

impl ForestParams {
    fn validate(&self) -> Result<(), TrainError> {
        if self.n_trees == 0 {
            return Err(TrainError::Forest("n_trees must be positive".into()));
        }
        if self.min_samples_split < 2 {
            return Err(TrainError::Forest("min_samples_split must be at least 2".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(TrainError::Forest("min_samples_leaf must be positive".into()));
        }
        Ok(())
    }
}

/// A node in a regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    /// Leaves have depth 0.
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    /// Returns NaN when a split references a feature outside the vector.
    pub fn predict(&self, x: &FeatureVector) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature, threshold, left, right } => {
                    let Some(v) = x.get(*feature) else {
                        return f64::NAN;
                    };
                    node = if *v <= *threshold { &**left } else { &**right };
                }
            }
        }
    }

    fn is_well_formed(&self) -> bool {
        match self {
            TreeNode::Leaf { value, .. } => value.is_finite(),
            TreeNode::Split { feature, threshold, left, right } => {
                *feature < N_FEATURES && threshold.is_finite() && left.is_well_formed() && right.is_well_formed()
            }
        }
    }
}

/// A single fitted regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: TreeNode,
}

impl RegressionTree {
    /// Fits on the rows of `x` selected by `indices` (duplicates allowed).
    /// Returns the tree and the impurity decrease credited to each feature.
    pub fn fit(
        x: &[FeatureVector],
        y: &[f64],
        indices: Vec<usize>,
        params: &ForestParams,
    ) -> (Self, [f64; N_FEATURES]) {
        let mut builder = TreeBuilder { x, y, params, gains: [0.0; N_FEATURES] };
        let root = builder.build(indices, 0);
        (RegressionTree { root }, builder.gains)
    }

    pub fn predict(&self, x: &FeatureVector) -> f64 {
        self.root.predict(x)
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }
}

struct TreeBuilder<'a> {
    x: &'a [FeatureVector],
    y: &'a [f64],
    params: &'a ForestParams,
    gains: [f64; N_FEATURES],
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        if depth >= self.params.max_depth || indices.len() < self.params.min_samples_split {
            return self.leaf(&indices);
        }
        let Some(best) = self.find_best_split(&indices) else {
            return self.leaf(&indices);
        };

        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| self.x[i][best.feature] <= best.threshold);
        if left.is_empty() || right.is_empty() {
            return self.leaf(&indices);
        }

        self.gains[best.feature] += best.gain;
        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(left, depth + 1)),
            right: Box::new(self.build(right, depth + 1)),
        }
    }

    fn leaf(&self, indices: &[usize]) -> TreeNode {
        TreeNode::Leaf { value: mean_of(self.y, indices), n_samples: indices.len() }
    }

    /// Sorted sweep per feature with running sums; gain is the drop in
    /// summed squared error `SSE(parent) - SSE(left) - SSE(right)`.
    fn find_best_split(&self, indices: &[usize]) -> Option<BestSplit> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf;
        if n < 2 * min_leaf {
            return None;
        }
        let total_sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| self.y[i] * self.y[i]).sum();
        let parent_sse = sse(total_sum, total_sq, n as f64);

        let mut best: Option<BestSplit> = None;
        let mut order = indices.to_vec();
        for feature in 0..N_FEATURES {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for k in 0..n - 1 {
                let yi = self.y[order[k]];
                left_sum += yi;
                left_sq += yi * yi;

                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let here = self.x[order[k]][feature];
                let next = self.x[order[k + 1]][feature];
                if here == next {
                    continue;
                }

                let child_sse = sse(left_sum, left_sq, n_left as f64)
                    + sse(total_sum - left_sum, total_sq - left_sq, n_right as f64);
                let gain = parent_sse - child_sse;
                if gain > 0.0 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = (here + next) / 2.0;
                    // midpoint can round up to `next` for adjacent floats
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(BestSplit { feature, threshold, gain });
                }
            }
        }
        best
    }
}

fn sse(sum: f64, sum_sq: f64, n: f64) -> f64 {
    (sum_sq - sum * sum / n).max(0.0)
}

fn mean_of(y: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

/// Averaging ensemble of regression trees with normalized importances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    feature_importances: [f64; N_FEATURES],
}

impl RandomForest {
    pub fn fit(x: &[FeatureVector], y: &[f64], params: &ForestParams, seed: u64) -> Result<Self, TrainError> {
        params.validate()?;
        if x.len() != y.len() {
            return Err(TrainError::Forest(format!("{} rows but {} targets", x.len(), y.len())));
        }
        if x.is_empty() {
            return Err(TrainError::TooFewSamples { n: 0, min: 1 });
        }

        let n = x.len();
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut totals = [0.0; N_FEATURES];
        for t in 0..params.n_trees {
            let indices = if params.bootstrap {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                (0..n).map(|_| rng.random_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            let (tree, gains) = RegressionTree::fit(x, y, indices, params);
            let tree_total: f64 = gains.iter().sum();
            if tree_total > 0.0 {
                for (acc, g) in totals.iter_mut().zip(gains) {
                    *acc += g / tree_total;
                }
            }
            trees.push(tree);
        }

        Ok(RandomForest { trees, feature_importances: normalize_importances(totals) })
    }

    /// Mean of the per-tree predictions.
    pub fn predict(&self, x: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return f64::NAN;
        }
        self.trees.iter().map(|t| t.predict(x)).sum::<f64>() / self.trees.len() as f64
    }

    /// Sums to 1 across features.
    pub fn feature_importances(&self) -> &[f64; N_FEATURES] {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn is_well_formed(&self) -> bool {
        let importance_sum: f64 = self.feature_importances.iter().sum();
        !self.trees.is_empty()
            && self.trees.iter().all(|t| t.root.is_well_formed())
            && self.feature_importances.iter().all(|v| v.is_finite() && *v >= 0.0)
            && (importance_sum - 1.0).abs() < 1e-6
    }
}

/// Scales to sum 1; with no split anywhere every feature gets an equal share.
fn normalize_importances(totals: [f64; N_FEATURES]) -> [f64; N_FEATURES] {
    let sum: f64 = totals.iter().sum();
    if sum > 0.0 {
        totals.map(|v| v / sum)
    } else {
        [1.0 / N_FEATURES as f64; N_FEATURES]
    }
}
