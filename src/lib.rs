//! This file is the root of the `tabula` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of the library (`table`, `bridge`,
//!     `dispatch`, `engine`, `model`, ...).
//! 2.  Re-exporting the types a caller needs for one train / predict round.
//! 3.  Defining the `#[pymodule]` (feature `python`) which acts as the entry
//!     point when the compiled library is imported into Python.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//==================================================================================
// 1. Module Declarations
//==================================================================================
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod observability;
pub mod table;
pub mod telemetry;
pub mod types;

#[cfg(feature = "python")]
mod ffi;

//==================================================================================
// 2. Public API Re-exports
//==================================================================================
pub use config::{ColumnTypeOverride, ComparisonMetric, GridItem, TrainingConfig};
pub use dispatch::Dispatcher;
pub use engine::{ReferenceEngine, TrainingEngine};
pub use error::TabulaError;
pub use model::predict::{PredictInput, PredictOptions, PredictOutput, PredictValue};
pub use model::ModelHandle;
pub use observability::enable_verbose_logging;
pub use table::{ChunkedTable, RecordFrame, TableInput};
pub use types::{ColumnType, Task};

/// Trains with the reference engine and the default (log) telemetry sink.
pub fn train(
    train: &TableInput,
    test: Option<&TableInput>,
    target: &str,
    config: &TrainingConfig,
) -> Result<ModelHandle, TabulaError> {
    Dispatcher::new(ReferenceEngine::new()).train(train, test, target, config)
}

//==================================================================================
// 3. Python Module Definition
//==================================================================================
#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The `tabula` Python module, containing all exposed Rust functions.
#[cfg(feature = "python")]
#[pymodule]
fn tabula(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(ffi::train_py, m)?)?;
    m.add_class::<ffi::PyModel>()?;

    // --- Expose the error type ---
    m.add(
        "TabulaError",
        m.py().get_type_bound::<pyo3::exceptions::PyValueError>(),
    )?;

    // --- Expose version string as a module attribute ---
    m.add("__version__", VERSION)?;

    // --- Turn on logging for the dispatcher and the engine ---
    m.add_function(wrap_pyfunction!(ffi::enable_verbose_logging_py, m)?)?;

    Ok(())
}
