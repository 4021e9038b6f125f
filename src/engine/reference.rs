// In: src/engine/reference.rs

//! The in-process reference engine.
//!
//! Imports the exported tables, encodes the features, shuffles and splits the
//! train rows into fit / comparison (/ test) sets, and fits every grid item with
//! the linear or tree trainer.

use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::{
    EarlyStoppingOptions, GridItem, GridSpec, LinearGridItem, ModelFamily, TreeGridItem,
};
use crate::engine::dataset::{Dataset, TargetValues};
use crate::engine::features::FeatureEncoder;
use crate::engine::linear::{LinearModel, LinearOptions};
use crate::engine::tree::{TreeModel, TreeOptions};
use crate::engine::{
    CandidateOutcome, Contributions, EngineError, FeatureValue, RawPrediction, TrainRequest,
    TrainedModel, TrainingEngine,
};
use crate::metrics::{
    binary_classification_metrics, multiclass_classification_metrics, regression_metrics,
    Metrics,
};
use crate::types::Task;

//==================================================================================
// I. Objectives and Targets
//==================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Regression,
    BinaryClassification,
    MulticlassClassification { n_classes: usize },
}

impl Objective {
    /// Width of the raw score matrix.
    pub fn n_outputs(&self) -> usize {
        match self {
            Objective::Regression | Objective::BinaryClassification => 1,
            Objective::MulticlassClassification { n_classes } => *n_classes,
        }
    }

    /// Maps raw scores onto the target matrix's scale: identity, sigmoid or softmax.
    pub fn activate(&self, scores: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Objective::Regression => scores.to_owned(),
            Objective::BinaryClassification => scores.mapv(sigmoid),
            Objective::MulticlassClassification { .. } => {
                let mut activated = scores.to_owned();
                for mut row in activated.rows_mut() {
                    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|v| v / sum);
                }
                activated
            }
        }
    }

    /// Model outputs per row: the value for regression, class probabilities otherwise.
    pub fn outputs(&self, scores: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Objective::BinaryClassification => {
                let positive = scores.mapv(sigmoid);
                Array2::from_shape_fn((scores.nrows(), 2), |(i, j)| {
                    if j == 1 {
                        positive[[i, 0]]
                    } else {
                        1.0 - positive[[i, 0]]
                    }
                })
            }
            _ => self.activate(scores),
        }
    }

    /// Mean loss of `activated` against the target matrix.
    pub fn loss(&self, activated: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let n = activated.nrows().max(1) as f32;
        let total: f32 = match self {
            Objective::Regression => activated
                .iter()
                .zip(y.iter())
                .map(|(a, t)| (a - t).powi(2))
                .sum(),
            Objective::BinaryClassification => activated
                .iter()
                .zip(y.iter())
                .map(|(&p, &t)| {
                    let p = p.clamp(1e-7, 1.0 - 1e-7);
                    -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                })
                .sum(),
            Objective::MulticlassClassification { .. } => activated
                .iter()
                .zip(y.iter())
                .map(|(&p, &t)| -t * p.max(1e-7).ln())
                .sum(),
        };
        total / n
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    Regression(Vec<f32>),
    Classes { labels: Vec<usize>, n_classes: usize },
}

impl Targets {
    pub fn from_dataset(task: Task, dataset: &Dataset) -> Result<Self, EngineError> {
        match (task, &dataset.target) {
            (Task::Regression, TargetValues::Regression(values)) => {
                Ok(Targets::Regression(values.clone()))
            }
            (
                Task::BinaryClassification | Task::MulticlassClassification,
                TargetValues::Classification { variants, labels },
            ) => Ok(Targets::Classes {
                labels: labels.clone(),
                n_classes: variants.len(),
            }),
            (task, _) => Err(EngineError::Import {
                column: dataset.target_name.clone(),
                reason: format!("target values do not fit a {task} task"),
            }),
        }
    }

    pub fn objective(&self) -> Objective {
        match self {
            Targets::Regression(_) => Objective::Regression,
            Targets::Classes { n_classes, .. } if *n_classes <= 2 => {
                Objective::BinaryClassification
            }
            Targets::Classes { n_classes, .. } => Objective::MulticlassClassification {
                n_classes: *n_classes,
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Targets::Regression(values) => values.len(),
            Targets::Classes { labels, .. } => labels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn select(&self, rows: &[usize]) -> Self {
        match self {
            Targets::Regression(values) => {
                Targets::Regression(rows.iter().map(|&r| values[r]).collect())
            }
            Targets::Classes { labels, n_classes } => Targets::Classes {
                labels: rows.iter().map(|&r| labels[r]).collect(),
                n_classes: *n_classes,
            },
        }
    }

    /// The target as a matrix matching the raw score layout: the value, the
    /// positive indicator (binary) or a one-hot row (multiclass).
    pub fn matrix(&self) -> Array2<f32> {
        match (self, self.objective()) {
            (Targets::Regression(values), _) => {
                Array2::from_shape_fn((values.len(), 1), |(i, _)| values[i])
            }
            (Targets::Classes { labels, .. }, Objective::BinaryClassification) => {
                Array2::from_shape_fn((labels.len(), 1), |(i, _)| (labels[i] == 1) as u8 as f32)
            }
            (Targets::Classes { labels, n_classes }, _) => {
                Array2::from_shape_fn((labels.len(), *n_classes), |(i, k)| {
                    (labels[i] == k) as u8 as f32
                })
            }
        }
    }

    /// Scores model outputs (see `Objective::outputs`) against these targets.
    pub fn metrics(&self, outputs: &Array2<f32>) -> Metrics {
        match self {
            Targets::Regression(values) => {
                let predictions: Vec<f32> = outputs.column(0).to_vec();
                Metrics::Regression(regression_metrics(&predictions, values))
            }
            Targets::Classes { labels, n_classes } if *n_classes <= 2 => {
                let positive: Vec<f32> = outputs.column(1).to_vec();
                let is_positive: Vec<bool> = labels.iter().map(|&l| l == 1).collect();
                Metrics::BinaryClassification(binary_classification_metrics(
                    &positive,
                    &is_positive,
                ))
            }
            Targets::Classes { labels, n_classes } => {
                let probabilities: Vec<Vec<f32>> =
                    outputs.rows().into_iter().map(|row| row.to_vec()).collect();
                Metrics::MulticlassClassification(multiclass_classification_metrics(
                    &probabilities,
                    labels,
                    *n_classes,
                ))
            }
        }
    }
}

//==================================================================================
// II. Early Stopping
//==================================================================================

/// Tracks a validation loss and reports when it stops improving.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    options: EarlyStoppingOptions,
    best_loss: f32,
    rounds_without_improvement: usize,
}

impl EarlyStopping {
    pub fn new(options: &EarlyStoppingOptions) -> Self {
        Self {
            options: options.clone(),
            best_loss: f32::INFINITY,
            rounds_without_improvement: 0,
        }
    }

    pub fn should_stop(&mut self, loss: f32) -> bool {
        if loss < self.best_loss - self.options.min_decrease_in_loss_for_significant_change {
            self.best_loss = loss;
            self.rounds_without_improvement = 0;
        } else {
            self.rounds_without_improvement += 1;
        }
        self.rounds_without_improvement >= self.options.n_rounds_without_improvement_to_stop
    }
}

/// Splits `0..n_rows` into fit rows and early stopping validation rows (the tail).
///
/// Without options, or when the split would leave either side empty, every row
/// is a fit row.
pub fn early_stopping_split(
    n_rows: usize,
    options: Option<&EarlyStoppingOptions>,
) -> (Vec<usize>, Vec<usize>) {
    let n_validation = options.map_or(0, |o| {
        (n_rows as f32 * o.early_stopping_fraction).round() as usize
    });
    if n_validation == 0 || n_validation >= n_rows {
        return ((0..n_rows).collect(), Vec::new());
    }
    let n_fit = n_rows - n_validation;
    ((0..n_fit).collect(), (n_fit..n_rows).collect())
}

//==================================================================================
// III. The Engine
//==================================================================================

#[derive(Debug, Clone, Default)]
pub struct ReferenceEngine;

impl ReferenceEngine {
    pub fn new() -> Self {
        Self
    }

    /// The grid searched when the caller gives none.
    pub fn default_grid(model_types: Option<&[ModelFamily]>) -> Vec<GridItem> {
        let all = [
            GridItem::Linear(LinearGridItem::default()),
            GridItem::Tree(TreeGridItem::default()),
        ];
        all.into_iter()
            .filter(|item| model_types.map_or(true, |types| types.contains(&item.family())))
            .collect()
    }
}

/// Row indices of each split, positions into the shuffled train table.
#[derive(Debug, Clone, PartialEq)]
struct Splits {
    fit: Vec<usize>,
    comparison: Vec<usize>,
    /// Empty when the caller supplied a test table.
    test: Vec<usize>,
}

impl Splits {
    fn new(
        rows: Vec<usize>,
        has_test_table: bool,
        test_fraction: f32,
        comparison_fraction: f32,
    ) -> Result<Self, EngineError> {
        let required = if has_test_table { 2 } else { 3 };
        if rows.len() < required {
            return Err(EngineError::InsufficientData {
                rows: rows.len(),
                required,
            });
        }

        let n_test = if has_test_table {
            0
        } else {
            split_size(rows.len(), test_fraction, rows.len() - 2)
        };
        let (test, rest) = rows.split_at(n_test);
        let n_comparison = split_size(rest.len(), comparison_fraction, rest.len() - 1);
        let (comparison, fit) = rest.split_at(n_comparison);
        Ok(Self {
            fit: fit.to_vec(),
            comparison: comparison.to_vec(),
            test: test.to_vec(),
        })
    }
}

/// `fraction` of `n`, rounded, kept within `1..=max`.
fn split_size(n: usize, fraction: f32, max: usize) -> usize {
    ((n as f32 * fraction).round() as usize).clamp(1, max)
}

impl TrainingEngine for ReferenceEngine {
    fn train(&self, request: TrainRequest) -> Result<Vec<CandidateOutcome>, EngineError> {
        let TrainRequest {
            train,
            test,
            task,
            grid,
            comparison_metric,
            shuffle,
            test_fraction,
            comparison_fraction,
        } = request;

        // 1. Import both tables. The exports are released as they are read.
        let train_data = Dataset::import(train)?;
        let test_data = test.map(Dataset::import).transpose()?;

        // 2. Encode.
        let encoder = FeatureEncoder::fit(&train_data);
        let x = encoder.encode_dataset(&train_data)?;
        let targets = Targets::from_dataset(task, &train_data)?;

        // 3. Shuffle and split.
        let mut rng = StdRng::seed_from_u64(shuffle.seed);
        let mut rows: Vec<usize> = (0..train_data.len()).collect();
        if shuffle.enable {
            rows.shuffle(&mut rng);
        }
        let splits = Splits::new(rows, test_data.is_some(), test_fraction, comparison_fraction)?;

        let x_fit = x.select(Axis(0), &splits.fit);
        let y_fit = targets.select(&splits.fit);
        let x_comparison = x.select(Axis(0), &splits.comparison);
        let y_comparison = targets.select(&splits.comparison);
        let (x_test, y_test) = match &test_data {
            Some(test_data) => (
                encoder.encode_dataset(test_data)?,
                Targets::from_dataset(task, test_data)?,
            ),
            None => (x.select(Axis(0), &splits.test), targets.select(&splits.test)),
        };

        // 4. Fit every candidate.
        let items = match grid {
            GridSpec::Explicit(items) => items,
            GridSpec::Auto(options) => Self::default_grid(options.model_types.as_deref()),
        };
        if items.is_empty() {
            return Err(EngineError::EmptyGrid);
        }
        log::info!(
            "Reference engine: {} candidate(s), {} fit / {} comparison / {} test rows, comparing on {}",
            items.len(),
            splits.fit.len(),
            splits.comparison.len(),
            y_test.len(),
            comparison_metric.name()
        );

        let objective = y_fit.objective();
        items
            .iter()
            .enumerate()
            .map(|(grid_index, item)| {
                let fitted = match item {
                    GridItem::Linear(item) => FittedModel::Linear(LinearModel::train(
                        x_fit.view(),
                        &y_fit,
                        &LinearOptions::from(item),
                        &mut rng,
                    )),
                    GridItem::Tree(item) => FittedModel::Tree(TreeModel::train(
                        x_fit.view(),
                        &y_fit,
                        &TreeOptions::from(item),
                    )),
                };
                let comparison_metrics =
                    y_comparison.metrics(&objective.outputs(fitted.scores(x_comparison.view()).view()));
                let test_metrics =
                    y_test.metrics(&objective.outputs(fitted.scores(x_test.view()).view()));

                Ok(CandidateOutcome {
                    grid_index,
                    family: item.family(),
                    comparison_metrics,
                    test_metrics,
                    model: Box::new(ReferenceModel {
                        encoder: encoder.clone(),
                        objective,
                        fitted,
                    }) as Box<dyn TrainedModel>,
                })
            })
            .collect()
    }
}

//==================================================================================
// IV. Trained Model
//==================================================================================

#[derive(Debug, Clone, PartialEq)]
enum FittedModel {
    Linear(LinearModel),
    Tree(TreeModel),
}

impl FittedModel {
    fn scores(&self, x: ArrayView2<f32>) -> Array2<f32> {
        match self {
            FittedModel::Linear(model) => model.scores(x),
            FittedModel::Tree(model) => model.scores(x),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceModel {
    encoder: FeatureEncoder,
    objective: Objective,
    fitted: FittedModel,
}

impl TrainedModel for ReferenceModel {
    fn family(&self) -> ModelFamily {
        match self.fitted {
            FittedModel::Linear(_) => ModelFamily::Linear,
            FittedModel::Tree(_) => ModelFamily::Tree,
        }
    }

    fn predict(
        &self,
        row: &[FeatureValue],
        compute_contributions: bool,
    ) -> Result<RawPrediction, EngineError> {
        let encoded = self.encoder.encode_row(row)?;
        let x = encoded.view().insert_axis(Axis(0));
        let outputs = self.objective.outputs(self.fitted.scores(x).view());

        let contributions = compute_contributions.then(|| {
            let per_output = match &self.fitted {
                FittedModel::Linear(model) => model.contributions(encoded.view()),
                FittedModel::Tree(model) => model.contributions(encoded.view()),
            };
            per_output
                .into_iter()
                .map(|(baseline, values)| Contributions {
                    baseline,
                    values: self.encoder.aggregate(&values),
                })
                .collect::<Vec<_>>()
        });

        Ok(match self.objective {
            Objective::Regression => RawPrediction::Regression {
                value: outputs[[0, 0]],
                contributions: contributions.and_then(|c| c.into_iter().next()),
            },
            _ => RawPrediction::Classification {
                probabilities: outputs.row(0).to_vec(),
                contributions,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{export_table, plan_columns, ExportLedger};
    use crate::config::{AutoGridOptions, ComparisonMetric, ShuffleConfig};
    use crate::table::{RecordFrame, TableInput};
    use serde_json::json;

    fn request(grid: GridSpec, ledger: &ExportLedger) -> TrainRequest {
        let records = (0..60)
            .map(|i| {
                let x = i as f64 / 10.0;
                json!({"x": x, "c": if i % 3 == 0 { "a" } else { "b" }, "y": 3.0 * x + 1.0})
                    .as_object()
                    .unwrap()
                    .clone()
            })
            .collect();
        let table = TableInput::from(RecordFrame::new(records)).normalize().unwrap();
        let plan = plan_columns(&table, &[]).unwrap();
        TrainRequest {
            train: export_table(&table, &plan, "y", ledger).unwrap(),
            test: None,
            task: Task::Regression,
            grid,
            comparison_metric: ComparisonMetric::Rmse,
            shuffle: ShuffleConfig::default(),
            test_fraction: 0.2,
            comparison_fraction: 0.1,
        }
    }

    #[test]
    fn test_splits_cover_all_rows_once() {
        let splits = Splits::new((0..20).collect(), false, 0.2, 0.1).unwrap();
        assert_eq!(splits.test.len(), 4);
        assert_eq!(splits.comparison.len(), 2);
        assert_eq!(splits.fit.len(), 14);

        let mut all: Vec<usize> = [splits.fit, splits.comparison, splits.test].concat();
        all.sort();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_splits_reject_tiny_tables() {
        assert!(matches!(
            Splits::new(vec![0, 1], false, 0.2, 0.1),
            Err(EngineError::InsufficientData { rows: 2, required: 3 })
        ));
        assert!(Splits::new(vec![0, 1], true, 0.2, 0.1).is_ok());
    }

    #[test]
    fn test_autogrid_fits_both_families_and_releases_exports() {
        let ledger = ExportLedger::new();
        let outcomes = ReferenceEngine::new()
            .train(request(GridSpec::Auto(AutoGridOptions::default()), &ledger))
            .unwrap();

        assert!(ledger.is_balanced());
        let families: Vec<_> = outcomes.iter().map(|o| o.family).collect();
        assert_eq!(families, vec![ModelFamily::Linear, ModelFamily::Tree]);
        for outcome in &outcomes {
            assert!(outcome.comparison_metrics.score(ComparisonMetric::Rmse).is_some());
        }
    }

    #[test]
    fn test_autogrid_respects_model_types() {
        let grid = ReferenceEngine::default_grid(Some(&[ModelFamily::Tree][..]));
        assert_eq!(grid.len(), 1);
        assert_eq!(grid[0].family(), ModelFamily::Tree);
        assert!(ReferenceEngine::default_grid(Some(&[][..])).is_empty());
    }

    #[test]
    fn test_linear_model_learns_the_linear_target() {
        let ledger = ExportLedger::new();
        let grid = GridSpec::Explicit(vec![GridItem::Linear(LinearGridItem {
            max_epochs: Some(200),
            ..Default::default()
        })]);
        let outcomes = ReferenceEngine::new().train(request(grid, &ledger)).unwrap();

        let Metrics::Regression(metrics) = &outcomes[0].test_metrics else {
            panic!("expected regression metrics");
        };
        assert!(metrics.rmse < metrics.baseline_rmse / 4.0, "{metrics:?}");
    }

    #[test]
    fn test_regression_contributions_add_up() {
        let ledger = ExportLedger::new();
        let grid = GridSpec::Explicit(vec![GridItem::Tree(TreeGridItem::default())]);
        let outcomes = ReferenceEngine::new().train(request(grid, &ledger)).unwrap();

        // Record keys are sorted, so the features are "c" then "x".
        let row = vec![FeatureValue::Enum(Some(0)), FeatureValue::Number(2.0)];
        let prediction = outcomes[0].model.predict(&row, true).unwrap();
        let RawPrediction::Regression {
            value,
            contributions: Some(contributions),
        } = prediction
        else {
            panic!("expected a regression prediction with contributions");
        };
        assert_eq!(contributions.values.len(), 2);
        assert!((contributions.output() - value).abs() < 1e-3);
    }
}
