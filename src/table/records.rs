//! Family A: row/attribute-oriented record frames.
//!
//! A `RecordFrame` is a list of records, each mapping column name to a JSON
//! scalar. Normalization transposes it into one Arrow array per column.

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray};
use arrow::datatypes::DataType;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TabulaError;
use crate::table::Column;

/// A row-oriented table: an optional explicit column order plus the records.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RecordFrame {
    /// Declared column order. If `None`, columns appear in first-seen order
    /// across the records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    pub records: Vec<Map<String, Value>>,
}

/// The scalar shape of a record column, accumulated value by value. Any two
/// different non-empty shapes merge to `Mixed`, including numbers with bools,
/// and a mixed column is stored as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueShape {
    Empty,
    Number,
    Bool,
    String,
    Mixed,
}

impl ValueShape {
    fn merge(self, other: ValueShape) -> ValueShape {
        match (self, other) {
            (ValueShape::Empty, s) | (s, ValueShape::Empty) => s,
            (a, b) if a == b => a,
            _ => ValueShape::Mixed,
        }
    }
}

impl RecordFrame {
    pub fn new(records: Vec<Map<String, Value>>) -> Self {
        Self {
            columns: None,
            records,
        }
    }

    /// Fixes the column order (and set) explicitly.
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Parses either a bare JSON array of objects or a
    /// `{"columns": [...], "records": [...]}` object.
    pub fn from_json_str(json: &str) -> Result<Self, TabulaError> {
        let value: Value = serde_json::from_str(json)?;
        match value {
            Value::Array(_) => Ok(Self::new(serde_json::from_value(value)?)),
            other => Ok(serde_json::from_value(other)?),
        }
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<String> {
        if let Some(columns) = &self.columns {
            return columns.clone();
        }
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if seen.insert(key.as_str()) {
                    names.push(key.clone());
                }
            }
        }
        names
    }

    /// Transposes the records into one single-chunk column per name.
    pub(crate) fn to_columns(&self) -> Result<Vec<Column>, TabulaError> {
        self.column_names()
            .into_iter()
            .map(|name| self.build_column(name))
            .collect()
    }

    fn build_column(&self, name: String) -> Result<Column, TabulaError> {
        let values: Vec<Option<&Value>> = self
            .records
            .iter()
            .map(|record| record.get(&name).filter(|v| !v.is_null()))
            .collect();

        let mut shape = ValueShape::Empty;
        for value in values.iter().flatten() {
            let value_shape = match value {
                Value::Number(_) => ValueShape::Number,
                Value::Bool(_) => ValueShape::Bool,
                Value::String(_) => ValueShape::String,
                nested => {
                    return Err(TabulaError::UnsupportedValue {
                        column: name,
                        found: nested.to_string(),
                    })
                }
            };
            shape = shape.merge(value_shape);
        }

        let array: ArrayRef = match shape {
            ValueShape::Empty | ValueShape::Number => Arc::new(
                values
                    .iter()
                    .map(|v| v.and_then(Value::as_f64))
                    .collect::<Float64Array>(),
            ),
            ValueShape::Bool => Arc::new(
                values
                    .iter()
                    .map(|v| v.and_then(Value::as_bool))
                    .collect::<BooleanArray>(),
            ),
            ValueShape::String | ValueShape::Mixed => Arc::new(
                values
                    .iter()
                    .map(|v| v.map(scalar_to_string))
                    .collect::<StringArray>(),
            ),
        };
        let data_type: DataType = array.data_type().clone();
        Ok(Column::new(name, data_type, vec![array]))
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // Integral floats print as integers, matching `number_strings`.
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map_or_else(|| n.to_string(), |f| f.to_string()),
        other => other.to_string(),
    }
}
