// In: src/ffi/python.rs

use std::sync::Arc;

use arrow::array::{make_array, ArrayData, ArrayRef, RecordBatchReader};
use arrow::datatypes::Schema;
use arrow::ffi_stream::ArrowArrayStreamReader;
use arrow::pyarrow::PyArrowType;
use arrow::record_batch::RecordBatch;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::config::TrainingConfig;
use crate::dispatch::Dispatcher;
use crate::engine::ReferenceEngine;
use crate::error::TabulaError;
use crate::model::predict::{PredictInput, PredictOptions, PredictOutput, PredictValue};
use crate::model::ModelHandle;
use crate::table::{ChunkedTable, RecordFrame, TableInput};

//==================================================================================
// I. Table Detection
//==================================================================================

/// Classifies a Python object as one of the two table families.
///
/// pyarrow tables keep their per-column chunking. pandas frames travel as
/// records JSON together with their column order. Anything else becomes
/// `TableInput::Foreign` and is rejected by the dispatcher.
fn table_input(obj: &Bound<'_, PyAny>) -> PyResult<TableInput> {
    let ty = obj.get_type();
    let module: String = ty.getattr("__module__")?.extract()?;
    let name: String = ty.getattr("__qualname__")?.extract()?;
    let package = module.split('.').next().unwrap_or_default();

    match (package, name.as_str()) {
        ("pyarrow", "Table") => pyarrow_table(obj),
        ("pyarrow", "RecordBatch") => {
            let PyArrowType(batch) = obj.extract::<PyArrowType<RecordBatch>>()?;
            Ok(TableInput::from(batch))
        }
        ("pyarrow", "RecordBatchReader") => {
            let PyArrowType(reader) = obj.extract::<PyArrowType<ArrowArrayStreamReader>>()?;
            let schema = reader.schema();
            let batches = reader
                .collect::<Result<Vec<_>, _>>()
                .map_err(TabulaError::from)?;
            Ok(TableInput::from(ChunkedTable::from_batches(schema, &batches)?))
        }
        ("pandas", "DataFrame") => pandas_frame(obj),
        _ => Ok(TableInput::foreign(format!("{module}.{name}"))),
    }
}

fn pyarrow_table(obj: &Bound<'_, PyAny>) -> PyResult<TableInput> {
    let PyArrowType(schema) = obj.getattr("schema")?.extract::<PyArrowType<Schema>>()?;
    let columns = (0..schema.fields().len())
        .map(|index| {
            obj.call_method1("column", (index,))?
                .getattr("chunks")?
                .iter()?
                .map(|chunk| {
                    let PyArrowType(data) = chunk?.extract::<PyArrowType<ArrayData>>()?;
                    Ok(make_array(data))
                })
                .collect::<PyResult<Vec<ArrayRef>>>()
        })
        .collect::<PyResult<Vec<_>>>()?;
    Ok(TableInput::from(ChunkedTable::try_new(Arc::new(schema), columns)?))
}

fn pandas_frame(obj: &Bound<'_, PyAny>) -> PyResult<TableInput> {
    let kwargs = PyDict::new_bound(obj.py());
    kwargs.set_item("orient", "records")?;
    let records: String = obj.call_method("to_json", (), Some(&kwargs))?.extract()?;

    let columns = obj
        .getattr("columns")?
        .call_method0("tolist")?
        .iter()?
        .map(|column| Ok(column?.str()?.to_string()))
        .collect::<PyResult<Vec<String>>>()?;

    let frame = RecordFrame::from_json_str(&records)?.with_columns(columns);
    Ok(TableInput::from(frame))
}

//==================================================================================
// II. JSON Round-Trips
//==================================================================================

fn to_json(value: &Bound<'_, PyAny>) -> PyResult<String> {
    let json = value.py().import_bound("json")?;
    json.call_method1("dumps", (value,))?.extract()
}

fn from_json(py: Python<'_>, text: &str) -> PyResult<PyObject> {
    let json = py.import_bound("json")?;
    Ok(json.call_method1("loads", (text,))?.unbind())
}

fn parse<T: serde::de::DeserializeOwned>(value: &Bound<'_, PyAny>) -> PyResult<T> {
    Ok(serde_json::from_str(&to_json(value)?).map_err(TabulaError::from)?)
}

fn render<T: serde::Serialize>(py: Python<'_>, value: &T) -> PyResult<PyObject> {
    from_json(py, &serde_json::to_string(value).map_err(TabulaError::from)?)
}

//==================================================================================
// III. Model
//==================================================================================

#[pyclass(name = "Model", module = "tabula")]
pub struct PyModel {
    inner: ModelHandle,
}

#[pymethods]
impl PyModel {
    /// The model's hex identifier.
    #[getter]
    fn id(&self) -> String {
        self.inner.id().to_string()
    }

    /// Predicts one record (a dict) or several (a list of dicts).
    #[pyo3(signature = (input, options = None))]
    fn predict(
        &self,
        py: Python<'_>,
        input: &Bound<'_, PyAny>,
        options: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<PyObject> {
        let options: PredictOptions = match options {
            Some(options) => parse(options)?,
            None => PredictOptions::default(),
        };
        if input.is_instance_of::<PyList>() {
            let inputs: Vec<PredictInput> = parse(input)?;
            let outputs = py.allow_threads(|| self.inner.predict_batch(&inputs, &options))?;
            render(py, &outputs)
        } else {
            let input: PredictInput = parse(input)?;
            let output = py.allow_threads(|| self.inner.predict(&input, &options))?;
            render(py, &output)
        }
    }

    fn test_metrics(&self, py: Python<'_>) -> PyResult<PyObject> {
        render(py, self.inner.test_metrics())
    }

    fn schema(&self, py: Python<'_>) -> PyResult<PyObject> {
        render(py, self.inner.schema())
    }

    fn candidates(&self, py: Python<'_>) -> PyResult<PyObject> {
        render(py, &self.inner.candidates())
    }

    #[pyo3(signature = (identifier, input, output, options = None))]
    fn log_prediction(
        &self,
        identifier: String,
        input: &Bound<'_, PyAny>,
        output: &Bound<'_, PyAny>,
        options: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<()> {
        let input: PredictInput = parse(input)?;
        let output: PredictOutput = parse(output)?;
        let options: Option<PredictOptions> = options.map(parse).transpose()?;
        self.inner.log_prediction(identifier, input, output, options);
        Ok(())
    }

    fn log_true_value(&self, identifier: String, true_value: &Bound<'_, PyAny>) -> PyResult<()> {
        let true_value: PredictValue = parse(true_value)?;
        self.inner.log_true_value(identifier, true_value);
        Ok(())
    }

    fn __repr__(&self) -> String {
        format!(
            "Model(id={}, task={}, family={:?})",
            self.inner.id(),
            self.inner.schema().task,
            self.inner.family()
        )
    }
}

//==================================================================================
// IV. Module Functions
//==================================================================================

/// Trains a model on `train` with the reference engine.
///
/// `config` is a dict mirroring `TrainingConfig`; omitted keys take defaults.
#[pyfunction]
#[pyo3(name = "train", signature = (train, target, test = None, config = None))]
pub fn train_py(
    py: Python<'_>,
    train: &Bound<'_, PyAny>,
    target: &str,
    test: Option<&Bound<'_, PyAny>>,
    config: Option<&Bound<'_, PyAny>>,
) -> PyResult<PyModel> {
    let train = table_input(train)?;
    let test = test.map(table_input).transpose()?;
    let config: TrainingConfig = match config {
        Some(config) => TrainingConfig::from_json_str(&to_json(config)?)?,
        None => TrainingConfig::default(),
    };

    let dispatcher = Dispatcher::new(ReferenceEngine::new());
    let handle =
        py.allow_threads(|| dispatcher.train(&train, test.as_ref(), target, &config))?;
    Ok(PyModel { inner: handle })
}

#[pyfunction]
#[pyo3(name = "enable_verbose_logging", signature = (log_file = None))]
pub fn enable_verbose_logging_py(log_file: Option<String>) -> PyResult<()> {
    crate::observability::enable_verbose_logging(log_file)?;
    Ok(())
}
