// In: src/engine/linear.rs

//! Linear models trained by mini-batch gradient descent: linear regression,
//! logistic regression (binary) and softmax regression (multiclass).

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::config::{EarlyStoppingOptions, LinearGridItem};
use crate::engine::reference::{early_stopping_split, EarlyStopping, Objective, Targets};

#[derive(Debug, Clone, PartialEq)]
pub struct LinearOptions {
    pub l2_regularization: f32,
    pub learning_rate: f32,
    pub max_epochs: usize,
    pub n_examples_per_batch: usize,
    pub early_stopping_options: Option<EarlyStoppingOptions>,
}

impl Default for LinearOptions {
    fn default() -> Self {
        Self {
            l2_regularization: 0.0,
            learning_rate: 0.1,
            max_epochs: 100,
            n_examples_per_batch: 32,
            early_stopping_options: None,
        }
    }
}

impl From<&LinearGridItem> for LinearOptions {
    fn from(item: &LinearGridItem) -> Self {
        let defaults = Self::default();
        Self {
            l2_regularization: item.l2_regularization.unwrap_or(defaults.l2_regularization),
            learning_rate: item.learning_rate.unwrap_or(defaults.learning_rate),
            max_epochs: item
                .max_epochs
                .map_or(defaults.max_epochs, |v| v as usize),
            n_examples_per_batch: item
                .n_examples_per_batch
                .map_or(defaults.n_examples_per_batch, |v| v as usize),
            early_stopping_options: item.early_stopping_options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    objective: Objective,
    /// (encoded features, outputs)
    weights: Array2<f32>,
    biases: Array1<f32>,
    /// Regression targets are standardized for training; scores are mapped back.
    target_mean: f32,
    target_std: f32,
}

impl LinearModel {
    pub fn train(
        x: ArrayView2<f32>,
        targets: &Targets,
        options: &LinearOptions,
        rng: &mut StdRng,
    ) -> Self {
        let objective = targets.objective();
        let mut y = targets.matrix();
        let (target_mean, target_std) = match objective {
            Objective::Regression => {
                let (mean, std) = column_mean_and_std(y.column(0));
                y.mapv_inplace(|v| (v - mean) / std);
                (mean, std)
            }
            _ => (0.0, 1.0),
        };

        let n_outputs = objective.n_outputs();
        let mut weights = Array2::<f32>::zeros((x.ncols(), n_outputs));
        let mut biases = Array1::<f32>::zeros(n_outputs);

        let (fit_rows, validation_rows) =
            early_stopping_split(x.nrows(), options.early_stopping_options.as_ref());
        let mut stopper = options
            .early_stopping_options
            .as_ref()
            .filter(|_| !validation_rows.is_empty())
            .map(EarlyStopping::new);
        let x_validation = x.select(Axis(0), &validation_rows);
        let y_validation = y.select(Axis(0), &validation_rows);

        let batch_size = options.n_examples_per_batch.max(1);
        let mut order = fit_rows;
        for epoch in 0..options.max_epochs {
            order.shuffle(rng);
            for batch in order.chunks(batch_size) {
                let x_batch = x.select(Axis(0), batch);
                let y_batch = y.select(Axis(0), batch);
                let scores = x_batch.dot(&weights) + &biases;
                let residual = objective.activate(scores.view()) - &y_batch;

                let scale = 1.0 / batch.len() as f32;
                let weight_gradient =
                    x_batch.t().dot(&residual) * scale + &weights * options.l2_regularization;
                let bias_gradient = residual.sum_axis(Axis(0)) * scale;
                weights.scaled_add(-options.learning_rate, &weight_gradient);
                biases.scaled_add(-options.learning_rate, &bias_gradient);
            }

            if let Some(stopper) = stopper.as_mut() {
                let scores = x_validation.dot(&weights) + &biases;
                let loss = objective.loss(
                    objective.activate(scores.view()).view(),
                    y_validation.view(),
                );
                if stopper.should_stop(loss) {
                    log::debug!("Linear model stopped early after {} epochs", epoch + 1);
                    break;
                }
            }
        }

        Self {
            objective,
            weights,
            biases,
            target_mean,
            target_std,
        }
    }

    /// Raw scores per row: the predicted value for regression, logits otherwise.
    pub fn scores(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let scores = x.dot(&self.weights) + &self.biases;
        match self.objective {
            Objective::Regression => scores.mapv(|s| s * self.target_std + self.target_mean),
            _ => scores,
        }
    }

    /// Per output: the baseline score and each encoded column's share of it.
    pub fn contributions(&self, x: ArrayView1<f32>) -> Vec<(f32, Vec<f32>)> {
        let (scale, shift) = match self.objective {
            Objective::Regression => (self.target_std, self.target_mean),
            _ => (1.0, 0.0),
        };
        (0..self.objective.n_outputs())
            .map(|output| {
                let values = x
                    .iter()
                    .zip(self.weights.column(output))
                    .map(|(value, weight)| value * weight * scale)
                    .collect();
                (self.biases[output] * scale + shift, values)
            })
            .collect()
    }
}

fn column_mean_and_std(column: ArrayView1<f32>) -> (f32, f32) {
    let mean = column.mean().unwrap_or(0.0);
    let std = column.std(0.0);
    (mean, if std > 0.0 { std } else { 1.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn test_linear_regression_fits_a_line() {
        // y = 2x + 1
        let x = Array2::from_shape_fn((50, 1), |(i, _)| i as f32 / 25.0 - 1.0);
        let y: Vec<f32> = x.column(0).iter().map(|v| 2.0 * v + 1.0).collect();
        let targets = Targets::Regression(y);
        let options = LinearOptions {
            max_epochs: 300,
            n_examples_per_batch: 10,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);

        let model = LinearModel::train(x.view(), &targets, &options, &mut rng);

        let predicted = model.scores(array![[0.5f32]].view());
        assert!((predicted[[0, 0]] - 2.0).abs() < 0.05, "{}", predicted[[0, 0]]);
    }

    #[test]
    fn test_contributions_sum_to_score() {
        let x = array![[1.0f32, 0.0], [0.0, 1.0], [1.0, 1.0], [0.0, 0.0]];
        let targets = Targets::Classes {
            labels: vec![1, 0, 1, 0],
            n_classes: 2,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let model = LinearModel::train(x.view(), &targets, &LinearOptions::default(), &mut rng);

        let row = x.row(2);
        let score = model.scores(x.slice(ndarray::s![2..3, ..]))[[0, 0]];
        let contributions = model.contributions(row);
        let (baseline, values) = &contributions[0];
        assert!((baseline + values.iter().sum::<f32>() - score).abs() < 1e-5);
        // The first column separates the classes, so it pushes towards the positive one.
        assert!(values[0] > 0.0);
    }
}
