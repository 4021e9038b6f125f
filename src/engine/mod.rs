// In: src/engine/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Engine Seam
// ====================================================================================
//
// The dispatcher never fits models itself. It hands a `TrainRequest` (exported
// tables + the resolved grid) to a `TrainingEngine` and gets back one
// `CandidateOutcome` per fitted grid item. The engine owns the receiving side of
// the bridge: it imports the exported columns (see `dataset`) and drops them when
// it is done, which releases them.
//
//   Dispatcher --TrainRequest--> TrainingEngine::train --> Vec<CandidateOutcome>
//                                      |
//                                      `-> Dataset::import(ExportedTable)
//
// A fitted model is a `Box<dyn TrainedModel>`. At predict time the model handle
// validates the caller's record, converts it to `FeatureValue`s in schema order,
// and asks the model for a `RawPrediction`.
// ====================================================================================

pub mod dataset;
pub mod features;
pub mod linear;
pub mod reference;
pub mod tree;

use std::fmt;

use thiserror::Error;

use crate::bridge::ExportedTable;
use crate::config::{ComparisonMetric, GridSpec, ModelFamily, ShuffleConfig};
use crate::metrics::Metrics;
use crate::types::{ColumnType, Task};

pub use dataset::Dataset;
pub use reference::ReferenceEngine;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to import column '{column}': {reason}")]
    Import { column: String, reason: String },

    #[error("Target column '{0}' contains missing values")]
    MissingTargetValues(String),

    #[error("Not enough rows to train: {rows} rows, need at least {required}")]
    InsufficientData { rows: usize, required: usize },

    #[error("The grid contains no candidates")]
    EmptyGrid,

    #[error("Feature row has {found} values, the model expects {expected}")]
    FeatureCountMismatch { expected: usize, found: usize },

    #[error("Arrow operation failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

//==================================================================================
// I. Training
//==================================================================================

/// Everything the engine needs for one training call.
#[derive(Debug)]
pub struct TrainRequest {
    pub train: ExportedTable,
    /// The caller's test table. When absent the engine splits one off `train`.
    pub test: Option<ExportedTable>,
    pub task: Task,
    pub grid: GridSpec,
    pub comparison_metric: ComparisonMetric,
    pub shuffle: ShuffleConfig,
    pub test_fraction: f32,
    pub comparison_fraction: f32,
}

/// One fitted grid item.
#[derive(Debug)]
pub struct CandidateOutcome {
    /// Position in the grid the engine fitted (the autogrid's, if none was given).
    pub grid_index: usize,
    pub family: ModelFamily,
    /// Metrics on the comparison split, used to rank candidates.
    pub comparison_metrics: Metrics,
    /// Metrics on the test split.
    pub test_metrics: Metrics,
    pub model: Box<dyn TrainedModel>,
}

pub trait TrainingEngine {
    /// Fits every candidate of `request.grid` and reports them in grid order.
    fn train(&self, request: TrainRequest) -> Result<Vec<CandidateOutcome>, EngineError>;
}

//==================================================================================
// II. Prediction
//==================================================================================

/// One feature value, already validated against the column's type.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    /// NaN when missing.
    Number(f32),
    /// Index into the enum's variants.
    Enum(Option<usize>),
    Bool(Option<bool>),
    Text(Option<String>),
}

impl FeatureValue {
    pub fn missing(column_type: &ColumnType) -> Self {
        match column_type {
            ColumnType::Number => FeatureValue::Number(f32::NAN),
            ColumnType::Enum { .. } => FeatureValue::Enum(None),
            ColumnType::Bool => FeatureValue::Bool(None),
            ColumnType::Text => FeatureValue::Text(None),
        }
    }
}

/// Additive explanation of one output: `baseline + sum(values)` is the output.
#[derive(Debug, Clone, PartialEq)]
pub struct Contributions {
    pub baseline: f32,
    /// One entry per feature, in schema order.
    pub values: Vec<f32>,
}

impl Contributions {
    pub fn output(&self) -> f32 {
        self.baseline + self.values.iter().sum::<f32>()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawPrediction {
    Regression {
        value: f32,
        contributions: Option<Contributions>,
    },
    /// `probabilities` is in target variant order. For a binary task,
    /// `contributions` holds one entry explaining the positive class log-odds;
    /// for multiclass, one entry per class.
    Classification {
        probabilities: Vec<f32>,
        contributions: Option<Vec<Contributions>>,
    },
}

pub trait TrainedModel: fmt::Debug + Send + Sync {
    fn family(&self) -> ModelFamily;

    fn predict(
        &self,
        row: &[FeatureValue],
        compute_contributions: bool,
    ) -> Result<RawPrediction, EngineError>;
}
