// In: src/error.rs

//! This module defines the single, unified error type for the entire tabula library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabulaError {
    // =========================================================================
    // === Table Adapter Errors
    // =========================================================================
    #[error("Unsupported table kind: {found} is neither a record frame nor a chunked Arrow table")]
    UnsupportedTableKind { found: String },

    #[error("Inconsistent table kinds: train table is {train} but test table is an unsupported {test}")]
    InconsistentTableKinds { train: String, test: String },

    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("Column '{column}' has a chunk of type {found}, expected {expected}")]
    ChunkTypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Column '{column}' holds an unsupported value: {found}")]
    UnsupportedValue { column: String, found: String },

    #[error("Table has no columns")]
    EmptyTable,

    // =========================================================================
    // === Configuration Errors
    // =========================================================================
    #[error("Target column '{0}' does not exist in the table")]
    MissingTargetColumn(String),

    #[error("Column type override names unknown column '{0}'")]
    UnknownColumnOverride(String),

    #[error("Test table is missing column '{0}' present in the train table")]
    TestSchemaMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Comparison metric '{metric}' is not defined for {task} models")]
    IncompatibleComparisonMetric { metric: String, task: String },

    // =========================================================================
    // === Export Errors
    // =========================================================================
    #[error("Column '{column}' has length {found}, expected the table row count {expected}")]
    ColumnLengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Column '{column}' cannot be exported: {reason}")]
    ExportFailure { column: String, reason: String },

    // =========================================================================
    // === Prediction Errors
    // =========================================================================
    #[error("Unknown feature '{0}': the record does not match the training schema")]
    UnknownFeature(String),

    #[error("Value '{value}' is not a declared category of column '{column}'")]
    InvalidCategory { column: String, value: String },

    #[error("Column '{column}' expects a {expected} value, got {found}")]
    InvalidFeatureValue {
        column: String,
        expected: String,
        found: String,
    },

    // =========================================================================
    // === Engine Errors
    // =========================================================================
    /// An opaque failure surfaced from the training or prediction engine.
    #[error("Engine failure: {0}")]
    EngineFailure(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the Arrow library.
    #[error("Arrow operation failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// An error from the Serde JSON library, typically while reading field metadata or config.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

// =============================================================================
// === Manual `From` Implementations ===
// =============================================================================

impl From<crate::engine::EngineError> for TabulaError {
    fn from(err: crate::engine::EngineError) -> Self {
        TabulaError::EngineFailure(err.to_string())
    }
}

#[cfg(feature = "python")]
impl From<TabulaError> for pyo3::PyErr {
    fn from(err: TabulaError) -> pyo3::PyErr {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}
