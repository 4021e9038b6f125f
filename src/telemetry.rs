// In: src/telemetry.rs

//! Fire-and-forget prediction monitoring.
//!
//! A `ModelHandle` turns `log_prediction` / `log_true_value` calls into
//! `TelemetryEvent`s and hands them to an `EventSink`. Events for the same
//! prediction are correlated by the caller-supplied identifier. Sink failures
//! never reach the caller; the handle logs them and moves on.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::predict::{PredictInput, PredictOptions, PredictOutput, PredictValue};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Prediction(PredictionEvent),
    TrueValue(TrueValueEvent),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PredictionEvent {
    pub date: DateTime<Utc>,
    pub model_id: String,
    pub identifier: String,
    pub input: PredictInput,
    pub options: Option<PredictOptions>,
    pub output: PredictOutput,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrueValueEvent {
    pub date: DateTime<Utc>,
    pub model_id: String,
    pub identifier: String,
    pub true_value: PredictValue,
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Telemetry sink rejected the events: {0}")]
    Rejected(String),

    #[error("Failed to serialize telemetry event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for telemetry events. The transport is up to the implementation.
pub trait EventSink: fmt::Debug + Send + Sync {
    fn send(&self, events: &[TelemetryEvent]) -> Result<(), TelemetryError>;
}

/// Writes each event as one JSON line through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn send(&self, events: &[TelemetryEvent]) -> Result<(), TelemetryError> {
        for event in events {
            log::info!(target: "tabula::telemetry", "{}", serde_json::to_string(event)?);
        }
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn send(&self, _events: &[TelemetryEvent]) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Keeps events in memory, for inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemorySink {
    fn send(&self, events: &[TelemetryEvent]) -> Result<(), TelemetryError> {
        self.events
            .lock()
            .map_err(|e| TelemetryError::Rejected(e.to_string()))?
            .extend_from_slice(events);
        Ok(())
    }
}
