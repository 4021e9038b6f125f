// In: src/config.rs

//! The single source of truth for all tabula training configuration.
//!
//! This module defines the unified `TrainingConfig` struct, which is created once
//! at the application boundary (e.g., from a JSON document or a Python dictionary)
//! and then passed by reference to the dispatcher and the engine.
//!
//! Every recognized option is enumerated here with its default applied at
//! construction (`Default` and the serde default helpers). Downstream code never
//! re-derives a default from an absent field; the two `Option`s left on the struct
//! (`grid`, `comparison_metric`) mean "let the engine/task decide" and are
//! resolved by `grid_spec()` and `resolve_comparison_metric()`.

use serde::{Deserialize, Serialize};

use crate::error::TabulaError;
use crate::types::{ColumnType, Task};

//==================================================================================
// I. Column Type Overrides
//==================================================================================

/// A caller-declared type for a named column, replacing inference.
///
/// Serialized as `{"name": "b", "type": "enum", "variants": ["x", "y"]}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ColumnTypeOverride {
    pub name: String,
    #[serde(flatten)]
    pub column_type: ColumnType,
}

impl ColumnTypeOverride {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

//==================================================================================
// II. Dataset Handling
//==================================================================================

/// Controls the row shuffle applied before the train/test/comparison split.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShuffleConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_shuffle_seed")]
    pub seed: u64,
}

impl Default for ShuffleConfig {
    fn default() -> Self {
        Self {
            enable: true,
            seed: default_shuffle_seed(),
        }
    }
}

//==================================================================================
// III. Grid
//==================================================================================

/// The model families a grid item (or the autogrid) can request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Linear,
    Tree,
}

/// Options for the engine's own default search, used when no grid is given.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoGridOptions {
    /// Restricts the default search to these families. `None` means all.
    #[serde(default)]
    pub model_types: Option<Vec<ModelFamily>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EarlyStoppingOptions {
    #[serde(default = "default_early_stopping_fraction")]
    pub early_stopping_fraction: f32,
    #[serde(default = "default_early_stopping_rounds")]
    pub n_rounds_without_improvement_to_stop: usize,
    #[serde(default = "default_early_stopping_threshold")]
    pub min_decrease_in_loss_for_significant_change: f32,
}

impl Default for EarlyStoppingOptions {
    fn default() -> Self {
        Self {
            early_stopping_fraction: default_early_stopping_fraction(),
            n_rounds_without_improvement_to_stop: default_early_stopping_rounds(),
            min_decrease_in_loss_for_significant_change: default_early_stopping_threshold(),
        }
    }
}

/// Hyperparameters for a linear candidate. Absent fields take the engine's defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct LinearGridItem {
    #[serde(default)]
    pub l2_regularization: Option<f32>,
    #[serde(default)]
    pub learning_rate: Option<f32>,
    #[serde(default)]
    pub max_epochs: Option<u64>,
    #[serde(default)]
    pub n_examples_per_batch: Option<u64>,
    #[serde(default)]
    pub early_stopping_options: Option<EarlyStoppingOptions>,
}

/// Hyperparameters for a gradient boosted tree candidate.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TreeGridItem {
    #[serde(default)]
    pub l2_regularization: Option<f32>,
    #[serde(default)]
    pub learning_rate: Option<f32>,
    #[serde(default)]
    pub max_depth: Option<u64>,
    #[serde(default)]
    pub max_leaf_nodes: Option<u64>,
    #[serde(default)]
    pub max_rounds: Option<u64>,
    #[serde(default)]
    pub min_examples_per_node: Option<u64>,
    #[serde(default)]
    pub min_gain_to_split: Option<f32>,
    #[serde(default)]
    pub early_stopping_options: Option<EarlyStoppingOptions>,
}

/// One candidate model configuration. Grid order only matters as a tie-break.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridItem {
    Linear(LinearGridItem),
    Tree(TreeGridItem),
}

impl GridItem {
    pub fn family(&self) -> ModelFamily {
        match self {
            GridItem::Linear(_) => ModelFamily::Linear,
            GridItem::Tree(_) => ModelFamily::Tree,
        }
    }
}

/// What the engine is asked to search.
#[derive(Debug, Clone, PartialEq)]
pub enum GridSpec {
    /// Delegate entirely to the engine's default search.
    Auto(AutoGridOptions),
    /// Fit exactly these candidates, in this order.
    Explicit(Vec<GridItem>),
}

//==================================================================================
// IV. Comparison Metric
//==================================================================================

/// Whether a larger or smaller score wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricDirection {
    HigherIsBetter,
    LowerIsBetter,
}

/// The metric used to pick the best grid candidate.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMetric {
    Mae,
    Mse,
    Rmse,
    R2,
    Accuracy,
    Auc,
    F1,
}

impl ComparisonMetric {
    /// The explicit direction table. Directions are never inferred from names.
    pub fn direction(&self) -> MetricDirection {
        match self {
            ComparisonMetric::Accuracy
            | ComparisonMetric::Auc
            | ComparisonMetric::F1
            | ComparisonMetric::R2 => MetricDirection::HigherIsBetter,
            ComparisonMetric::Mae | ComparisonMetric::Mse | ComparisonMetric::Rmse => {
                MetricDirection::LowerIsBetter
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ComparisonMetric::Mae => "mae",
            ComparisonMetric::Mse => "mse",
            ComparisonMetric::Rmse => "rmse",
            ComparisonMetric::R2 => "r2",
            ComparisonMetric::Accuracy => "accuracy",
            ComparisonMetric::Auc => "auc",
            ComparisonMetric::F1 => "f1",
        }
    }

    /// The metric used when the caller does not name one.
    pub fn default_for(task: Task) -> Self {
        match task {
            Task::Regression => ComparisonMetric::Rmse,
            Task::BinaryClassification => ComparisonMetric::Auc,
            Task::MulticlassClassification => ComparisonMetric::Accuracy,
        }
    }

    /// Returns `true` if the engine reports this metric for `task`.
    pub fn supports(&self, task: Task) -> bool {
        match self {
            ComparisonMetric::Mae
            | ComparisonMetric::Mse
            | ComparisonMetric::Rmse
            | ComparisonMetric::R2 => task == Task::Regression,
            ComparisonMetric::Auc | ComparisonMetric::F1 => task == Task::BinaryClassification,
            ComparisonMetric::Accuracy => task != Task::Regression,
        }
    }
}

//==================================================================================
// V. The Unified TrainingConfig
//==================================================================================

/// The single, unified configuration for one training call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TrainingConfig {
    /// Caller-declared column types. Every name must exist in the train table.
    #[serde(default)]
    pub column_types: Vec<ColumnTypeOverride>,

    /// Row shuffle before splitting.
    #[serde(default)]
    pub shuffle: ShuffleConfig,

    /// Fraction of rows held out as the test set when no test table is given.
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f32,

    /// Fraction of the training rows held out to compare grid candidates.
    #[serde(default = "default_comparison_fraction")]
    pub comparison_fraction: f32,

    /// Explicit candidate grid. `None` delegates to the engine's autogrid.
    #[serde(default)]
    pub grid: Option<Vec<GridItem>>,

    /// Options for the autogrid. Ignored when `grid` is set.
    #[serde(default)]
    pub autogrid: AutoGridOptions,

    /// Metric used to compare candidates. `None` picks the task default.
    #[serde(default)]
    pub comparison_metric: Option<ComparisonMetric>,
}

// Default implementation to make constructing the config easier.
impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            column_types: Vec::new(),
            shuffle: ShuffleConfig::default(),
            test_fraction: default_test_fraction(),
            comparison_fraction: default_comparison_fraction(),
            grid: None,
            autogrid: AutoGridOptions::default(),
            comparison_metric: None,
        }
    }
}

impl TrainingConfig {
    pub fn from_json_str(json: &str) -> Result<Self, TabulaError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks the options that can be validated without seeing a table.
    pub fn validate(&self) -> Result<(), TabulaError> {
        check_fraction("test_fraction", self.test_fraction)?;
        check_fraction("comparison_fraction", self.comparison_fraction)?;

        for column_override in &self.column_types {
            if let ColumnType::Enum { variants } = &column_override.column_type {
                if variants.is_empty() {
                    return Err(TabulaError::InvalidConfig(format!(
                        "enum override for '{}' must list at least one variant",
                        column_override.name
                    )));
                }
                let mut sorted = variants.clone();
                sorted.sort();
                sorted.dedup();
                if sorted.len() != variants.len() {
                    return Err(TabulaError::InvalidConfig(format!(
                        "enum override for '{}' lists a variant twice",
                        column_override.name
                    )));
                }
            }
        }

        if let Some(grid) = &self.grid {
            if grid.is_empty() {
                return Err(TabulaError::InvalidConfig(
                    "grid must contain at least one item".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn grid_spec(&self) -> GridSpec {
        match &self.grid {
            Some(grid) => GridSpec::Explicit(grid.clone()),
            None => GridSpec::Auto(self.autogrid.clone()),
        }
    }

    /// Picks the comparison metric for `task`, rejecting one the task cannot report.
    pub fn resolve_comparison_metric(&self, task: Task) -> Result<ComparisonMetric, TabulaError> {
        let metric = self
            .comparison_metric
            .unwrap_or_else(|| ComparisonMetric::default_for(task));
        if !metric.supports(task) {
            return Err(TabulaError::IncompatibleComparisonMetric {
                metric: metric.name().to_string(),
                task: task.to_string(),
            });
        }
        Ok(metric)
    }

    pub fn column_override(&self, name: &str) -> Option<&ColumnTypeOverride> {
        self.column_types.iter().find(|o| o.name == name)
    }
}

fn check_fraction(name: &str, value: f32) -> Result<(), TabulaError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(TabulaError::InvalidConfig(format!(
            "{name} must lie strictly between 0 and 1, got {value}"
        )))
    }
}

/// Helper for `serde` to default a boolean field to true.
fn default_true() -> bool {
    true
}

fn default_shuffle_seed() -> u64 {
    42
}

fn default_test_fraction() -> f32 {
    0.2
}

fn default_comparison_fraction() -> f32 {
    0.1
}

fn default_early_stopping_fraction() -> f32 {
    0.1
}

fn default_early_stopping_rounds() -> usize {
    5
}

fn default_early_stopping_threshold() -> f32 {
    1e-5
}
