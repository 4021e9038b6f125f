// In: src/engine/tree.rs

//! Gradient boosted decision trees.
//!
//! Each round fits one regression tree per output to the loss gradients, using
//! second-order (Newton) leaf values `-G / (H + l2)` scaled by the learning rate.
//! Trees split on `x <= threshold` and are grown breadth first.

use std::collections::VecDeque;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::config::{EarlyStoppingOptions, TreeGridItem};
use crate::engine::reference::{early_stopping_split, EarlyStopping, Objective, Targets};

const MIN_HESSIAN: f32 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct TreeOptions {
    pub l2_regularization: f32,
    pub learning_rate: f32,
    pub max_depth: usize,
    pub max_leaf_nodes: usize,
    pub max_rounds: usize,
    pub min_examples_per_node: usize,
    pub min_gain_to_split: f32,
    pub early_stopping_options: Option<EarlyStoppingOptions>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            l2_regularization: 1.0,
            learning_rate: 0.1,
            max_depth: 5,
            max_leaf_nodes: 31,
            max_rounds: 100,
            min_examples_per_node: 5,
            min_gain_to_split: 0.0,
            early_stopping_options: None,
        }
    }
}

impl From<&TreeGridItem> for TreeOptions {
    fn from(item: &TreeGridItem) -> Self {
        let defaults = Self::default();
        let as_usize = |value: Option<u64>, default: usize| value.map_or(default, |v| v as usize);
        Self {
            l2_regularization: item.l2_regularization.unwrap_or(defaults.l2_regularization),
            learning_rate: item.learning_rate.unwrap_or(defaults.learning_rate),
            max_depth: as_usize(item.max_depth, defaults.max_depth),
            max_leaf_nodes: as_usize(item.max_leaf_nodes, defaults.max_leaf_nodes),
            max_rounds: as_usize(item.max_rounds, defaults.max_rounds),
            min_examples_per_node: as_usize(
                item.min_examples_per_node,
                defaults.min_examples_per_node,
            ),
            min_gain_to_split: item.min_gain_to_split.unwrap_or(defaults.min_gain_to_split),
            early_stopping_options: item.early_stopping_options.clone(),
        }
    }
}

//==================================================================================
// I. Single Tree
//==================================================================================

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Branch {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        /// The value this node would have as a leaf. Used for contributions.
        value: f32,
    },
    Leaf {
        value: f32,
    },
}

impl Node {
    fn value(&self) -> f32 {
        match self {
            Node::Branch { value, .. } | Node::Leaf { value } => *value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

struct Split {
    feature: usize,
    threshold: f32,
    gain: f32,
}

/// A node waiting to be grown.
struct PendingNode {
    index: usize,
    rows: Vec<usize>,
    depth: usize,
}

impl Tree {
    /// Grows one tree on `rows` of `x`, given per-row gradients and hessians.
    pub fn grow(
        x: ArrayView2<f32>,
        rows: Vec<usize>,
        gradients: &[f32],
        hessians: &[f32],
        options: &TreeOptions,
    ) -> Self {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut leaf_count = 1;
        let mut queue = VecDeque::from([PendingNode {
            index: 0,
            rows,
            depth: 0,
        }]);

        while let Some(PendingNode { index, rows, depth }) = queue.pop_front() {
            let (g, h) = sums(&rows, gradients, hessians);
            let value = leaf_value(g, h, options);
            nodes[index] = Node::Leaf { value };

            if depth >= options.max_depth
                || leaf_count >= options.max_leaf_nodes
                || rows.len() < 2 * options.min_examples_per_node.max(1)
            {
                continue;
            }
            let Some(split) = best_split(x, &rows, gradients, hessians, (g, h), options) else {
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                .into_iter()
                .partition(|&row| x[[row, split.feature]] <= split.threshold);
            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[index] = Node::Branch {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
                value,
            };
            leaf_count += 1;
            queue.push_back(PendingNode {
                index: left,
                rows: left_rows,
                depth: depth + 1,
            });
            queue.push_back(PendingNode {
                index: right,
                rows: right_rows,
                depth: depth + 1,
            });
        }
        Self { nodes }
    }

    pub fn predict(&self, x: ArrayView1<f32>) -> f32 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Branch {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => index = if x[*feature] <= *threshold { *left } else { *right },
            }
        }
    }

    /// Path-based contributions: each split on the decision path credits its
    /// feature with the change in node value. Returns the root value.
    pub fn add_contributions(&self, x: ArrayView1<f32>, contributions: &mut [f32]) -> f32 {
        let mut index = 0;
        while let Node::Branch {
            feature,
            threshold,
            left,
            right,
            value,
        } = &self.nodes[index]
        {
            let child = if x[*feature] <= *threshold { *left } else { *right };
            contributions[*feature] += self.nodes[child].value() - value;
            index = child;
        }
        self.nodes[0].value()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }
}

fn sums(rows: &[usize], gradients: &[f32], hessians: &[f32]) -> (f32, f32) {
    rows.iter()
        .fold((0.0, 0.0), |(g, h), &row| (g + gradients[row], h + hessians[row]))
}

fn leaf_value(g: f32, h: f32, options: &TreeOptions) -> f32 {
    -g / (h + options.l2_regularization) * options.learning_rate
}

fn split_score(g: f32, h: f32, l2: f32) -> f32 {
    g * g / (h + l2)
}

fn best_split(
    x: ArrayView2<f32>,
    rows: &[usize],
    gradients: &[f32],
    hessians: &[f32],
    (g_total, h_total): (f32, f32),
    options: &TreeOptions,
) -> Option<Split> {
    let l2 = options.l2_regularization;
    let min_examples = options.min_examples_per_node.max(1);
    let parent_score = split_score(g_total, h_total, l2);
    let mut best: Option<Split> = None;

    let mut sorted = rows.to_vec();
    for feature in 0..x.ncols() {
        sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let (mut g_left, mut h_left) = (0.0f32, 0.0f32);
        for i in 0..sorted.len() - 1 {
            let row = sorted[i];
            g_left += gradients[row];
            h_left += hessians[row];

            let n_left = i + 1;
            if n_left < min_examples || sorted.len() - n_left < min_examples {
                continue;
            }
            let current = x[[row, feature]];
            let next = x[[sorted[i + 1], feature]];
            if current == next {
                continue;
            }

            let gain = 0.5
                * (split_score(g_left, h_left, l2)
                    + split_score(g_total - g_left, h_total - h_left, l2)
                    - parent_score);
            if gain > options.min_gain_to_split && best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(Split {
                    feature,
                    threshold: (current + next) / 2.0,
                    gain,
                });
            }
        }
    }
    best
}

//==================================================================================
// II. Boosted Ensemble
//==================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TreeModel {
    objective: Objective,
    biases: Vec<f32>,
    /// One tree per output per round.
    rounds: Vec<Vec<Tree>>,
}

impl TreeModel {
    pub fn train(x: ArrayView2<f32>, targets: &Targets, options: &TreeOptions) -> Self {
        let objective = targets.objective();
        let n_outputs = objective.n_outputs();
        let y = targets.matrix();

        let (fit_rows, validation_rows) =
            early_stopping_split(x.nrows(), options.early_stopping_options.as_ref());
        let mut stopper = options
            .early_stopping_options
            .as_ref()
            .filter(|_| !validation_rows.is_empty())
            .map(EarlyStopping::new);
        let y_validation = y.select(Axis(0), &validation_rows);

        let biases = initial_biases(objective, &y.select(Axis(0), &fit_rows));
        let mut scores = Array2::from_shape_fn((x.nrows(), n_outputs), |(_, k)| biases[k]);
        let mut rounds = Vec::with_capacity(options.max_rounds);

        for round in 0..options.max_rounds {
            let activated = objective.activate(scores.view());
            let mut trees = Vec::with_capacity(n_outputs);
            for output in 0..n_outputs {
                let (gradients, hessians): (Vec<f32>, Vec<f32>) = activated
                    .column(output)
                    .iter()
                    .zip(y.column(output))
                    .map(|(&a, &label)| {
                        let hessian = match objective {
                            Objective::Regression => 1.0,
                            _ => (a * (1.0 - a)).max(MIN_HESSIAN),
                        };
                        (a - label, hessian)
                    })
                    .unzip();

                let tree = Tree::grow(x, fit_rows.clone(), &gradients, &hessians, options);
                for (row, score) in x.rows().into_iter().zip(scores.column_mut(output)) {
                    *score += tree.predict(row);
                }
                trees.push(tree);
            }
            rounds.push(trees);

            if let Some(stopper) = stopper.as_mut() {
                let validation_scores = scores.select(Axis(0), &validation_rows);
                let loss = objective.loss(
                    objective.activate(validation_scores.view()).view(),
                    y_validation.view(),
                );
                if stopper.should_stop(loss) {
                    log::debug!("Tree model stopped early after {} rounds", round + 1);
                    break;
                }
            }
        }

        Self {
            objective,
            biases,
            rounds,
        }
    }

    /// Raw scores per row: the predicted value for regression, logits otherwise.
    pub fn scores(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let mut scores =
            Array2::from_shape_fn((x.nrows(), self.biases.len()), |(_, k)| self.biases[k]);
        for (row, mut row_scores) in x.rows().into_iter().zip(scores.rows_mut()) {
            for trees in &self.rounds {
                for (score, tree) in row_scores.iter_mut().zip(trees) {
                    *score += tree.predict(row);
                }
            }
        }
        scores
    }

    /// Per output: the baseline score and each encoded column's share of it.
    pub fn contributions(&self, x: ArrayView1<f32>) -> Vec<(f32, Vec<f32>)> {
        (0..self.biases.len())
            .map(|output| {
                let mut values = vec![0.0; x.len()];
                let mut baseline = self.biases[output];
                for trees in &self.rounds {
                    baseline += trees[output].add_contributions(x, &mut values);
                }
                (baseline, values)
            })
            .collect()
    }

    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }
}

fn initial_biases(objective: Objective, y: &Array2<f32>) -> Vec<f32> {
    let means: Vec<f32> = y
        .mean_axis(Axis(0))
        .map_or_else(|| vec![0.0; y.ncols()], |m| m.to_vec());
    match objective {
        Objective::Regression => means,
        Objective::BinaryClassification => means
            .into_iter()
            .map(|p| {
                let p = p.clamp(1e-6, 1.0 - 1e-6);
                (p / (1.0 - p)).ln()
            })
            .collect(),
        Objective::MulticlassClassification { .. } => {
            means.into_iter().map(|p| p.max(1e-6).ln()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_single_split_on_step_function() {
        let x = array![[0.0f32], [1.0], [2.0], [3.0]];
        let gradients = [1.0, 1.0, -1.0, -1.0];
        let hessians = [1.0; 4];
        let options = TreeOptions {
            l2_regularization: 0.0,
            learning_rate: 1.0,
            min_examples_per_node: 1,
            max_depth: 1,
            ..Default::default()
        };

        let tree = Tree::grow(x.view(), vec![0, 1, 2, 3], &gradients, &hessians, &options);

        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict(x.row(0)), -1.0);
        assert_eq!(tree.predict(x.row(3)), 1.0);
    }

    #[test]
    fn test_boosting_reduces_regression_error() {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| i as f32);
        let y: Vec<f32> = (0..40).map(|i| if i < 20 { 0.0 } else { 10.0 }).collect();
        let targets = Targets::Regression(y.clone());
        let options = TreeOptions {
            max_rounds: 50,
            learning_rate: 0.3,
            ..Default::default()
        };

        let model = TreeModel::train(x.view(), &targets, &options);
        let scores = model.scores(x.view());

        assert_eq!(model.n_rounds(), 50);
        assert!((scores[[0, 0]] - 0.0).abs() < 0.5);
        assert!((scores[[39, 0]] - 10.0).abs() < 0.5);
    }

    #[test]
    fn test_contributions_sum_to_score() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| ((i * (j + 1)) % 7) as f32);
        let targets = Targets::Classes {
            labels: (0..30).map(|i| usize::from(i % 7 > 3)).collect(),
            n_classes: 2,
        };
        let model = TreeModel::train(x.view(), &targets, &TreeOptions::default());

        let scores = model.scores(x.view());
        for i in [0, 5, 17] {
            let contributions = model.contributions(x.row(i));
            let (baseline, values) = &contributions[0];
            let total = baseline + values.iter().sum::<f32>();
            assert!((total - scores[[i, 0]]).abs() < 1e-4);
        }
    }
}
