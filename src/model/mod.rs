// In: src/model/mod.rs

//! The trained model handle returned by the dispatcher.
//!
//! A `ModelHandle` owns the selected engine model, the schema it was trained on,
//! the cached test metrics and the losing candidates' scores. Predictions are
//! validated against the schema before they reach the engine.

pub mod predict;

use std::fmt;
use std::sync::Arc;

use arrow_schema::DataType;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::{ComparisonMetric, ModelFamily};
use crate::engine::TrainedModel;
use crate::error::TabulaError;
use crate::metrics::Metrics;
use crate::telemetry::{EventSink, PredictionEvent, TelemetryEvent, TrueValueEvent};
use crate::types::{ColumnType, Task};

use predict::{build_output, prepare_row, PredictInput, PredictOptions, PredictOutput, PredictValue};

//==================================================================================
// I. Identity and Schema
//==================================================================================

/// Random 128-bit model identifier, rendered as 32 hex digits.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(u128);

impl ModelId {
    pub fn generate() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    pub name: String,
    pub column_type: ColumnType,
    /// The physical Arrow type the column was exported as.
    pub data_type: DataType,
}

/// What the model was trained on. Features are in export order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelSchema {
    pub target: String,
    pub target_type: ColumnType,
    pub task: Task,
    pub features: Vec<FeatureSchema>,
}

impl ModelSchema {
    pub fn feature(&self, name: &str) -> Option<&FeatureSchema> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Class names in label order. Empty for regression.
    pub fn target_variants(&self) -> Vec<String> {
        self.target_type.variants().unwrap_or_default()
    }
}

/// One fitted grid candidate, kept for diagnostics.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CandidateSummary {
    pub grid_index: usize,
    pub family: ModelFamily,
    pub comparison_metric: ComparisonMetric,
    /// `None` when the engine did not report the metric.
    pub comparison_score: Option<f32>,
    pub selected: bool,
}

//==================================================================================
// II. The Handle
//==================================================================================

pub struct ModelHandle {
    id: ModelId,
    schema: ModelSchema,
    model: Box<dyn TrainedModel>,
    test_metrics: Metrics,
    candidates: Vec<CandidateSummary>,
    sink: Arc<dyn EventSink>,
    log_queue: Vec<TelemetryEvent>,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("id", &self.id.to_string())
            .field("task", &self.schema.task)
            .field("family", &self.model.family())
            .field("queued_events", &self.log_queue.len())
            .finish()
    }
}

impl ModelHandle {
    pub fn new(
        schema: ModelSchema,
        model: Box<dyn TrainedModel>,
        test_metrics: Metrics,
        candidates: Vec<CandidateSummary>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            id: ModelId::generate(),
            schema,
            model,
            test_metrics,
            candidates,
            sink,
            log_queue: Vec::new(),
        }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn candidates(&self) -> &[CandidateSummary] {
        &self.candidates
    }

    pub fn family(&self) -> ModelFamily {
        self.model.family()
    }

    /// Metrics on the test split, computed once at training time.
    pub fn test_metrics(&self) -> &Metrics {
        &self.test_metrics
    }

    pub fn predict(
        &self,
        input: &PredictInput,
        options: &PredictOptions,
    ) -> Result<PredictOutput, TabulaError> {
        check_options(options)?;
        let row = prepare_row(&self.schema, input)?;
        let raw = self
            .model
            .predict(&row, options.compute_feature_contributions)?;
        build_output(&self.schema, raw, options)
    }

    /// Predicts every record, failing on the first invalid one.
    pub fn predict_batch(
        &self,
        inputs: &[PredictInput],
        options: &PredictOptions,
    ) -> Result<Vec<PredictOutput>, TabulaError> {
        check_options(options)?;
        inputs.iter().map(|input| self.predict(input, options)).collect()
    }

    //------------------------------------------------------------------------------
    // Telemetry
    //------------------------------------------------------------------------------

    pub fn log_prediction(
        &self,
        identifier: impl Into<String>,
        input: PredictInput,
        output: PredictOutput,
        options: Option<PredictOptions>,
    ) {
        let event = self.prediction_event(identifier.into(), input, output, options);
        self.send(&[event]);
    }

    pub fn log_true_value(&self, identifier: impl Into<String>, true_value: PredictValue) {
        let event = self.true_value_event(identifier.into(), true_value);
        self.send(&[event]);
    }

    /// Queues the event until `flush_log_queue`.
    pub fn enqueue_log_prediction(
        &mut self,
        identifier: impl Into<String>,
        input: PredictInput,
        output: PredictOutput,
        options: Option<PredictOptions>,
    ) {
        let event = self.prediction_event(identifier.into(), input, output, options);
        self.log_queue.push(event);
    }

    pub fn enqueue_log_true_value(&mut self, identifier: impl Into<String>, true_value: PredictValue) {
        let event = self.true_value_event(identifier.into(), true_value);
        self.log_queue.push(event);
    }

    /// Sends every queued event in one batch. The queue is emptied even if the
    /// sink fails.
    pub fn flush_log_queue(&mut self) {
        if self.log_queue.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.log_queue);
        self.send(&events);
    }

    pub fn queued_events(&self) -> usize {
        self.log_queue.len()
    }

    fn prediction_event(
        &self,
        identifier: String,
        input: PredictInput,
        output: PredictOutput,
        options: Option<PredictOptions>,
    ) -> TelemetryEvent {
        TelemetryEvent::Prediction(PredictionEvent {
            date: Utc::now(),
            model_id: self.id.to_string(),
            identifier,
            input,
            options,
            output,
        })
    }

    fn true_value_event(&self, identifier: String, true_value: PredictValue) -> TelemetryEvent {
        TelemetryEvent::TrueValue(TrueValueEvent {
            date: Utc::now(),
            model_id: self.id.to_string(),
            identifier,
            true_value,
        })
    }

    fn send(&self, events: &[TelemetryEvent]) {
        if let Err(e) = self.sink.send(events) {
            log::warn!(
                "Dropping {} telemetry event(s) for model {}: {}",
                events.len(),
                self.id,
                e
            );
        }
    }
}

fn check_options(options: &PredictOptions) -> Result<(), TabulaError> {
    if (0.0..=1.0).contains(&options.threshold) {
        Ok(())
    } else {
        Err(TabulaError::InvalidConfig(format!(
            "threshold must lie in [0, 1], got {}",
            options.threshold
        )))
    }
}
