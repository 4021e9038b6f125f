// In: src/engine/dataset.rs

//! The receiving side of the bridge: imports an `ExportedTable` into typed,
//! engine-owned columns.
//!
//! Each column is imported, read into a typed vector and dropped before the next
//! one is imported, so at most one borrowed column is alive at a time.

use arrow::array::{Array, ArrowPrimitiveType, AsArray, PrimitiveArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use hashbrown::HashMap;
use num_traits::ToPrimitive;

use crate::bridge::{ExportedArray, ExportedTable, ImportedArray};
use crate::engine::{EngineError, FeatureValue};
use crate::types::column_type::string_values;
use crate::types::ColumnType;

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureColumnValues {
    /// NaN for missing values.
    Number(Vec<f32>),
    Enum(Vec<Option<usize>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub values: FeatureColumnValues,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetValues {
    Regression(Vec<f32>),
    /// Labels index into `variants`.
    Classification {
        variants: Vec<String>,
        labels: Vec<usize>,
    },
}

/// A fully imported table, owned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Vec<FeatureColumn>,
    pub target_name: String,
    pub target: TargetValues,
    len: usize,
}

impl Dataset {
    /// Imports every exported column. The exports are released as each column is read.
    pub fn import(table: ExportedTable) -> Result<Self, EngineError> {
        let ExportedTable {
            features,
            target,
            row_count,
        } = table;

        let features = features
            .into_iter()
            .map(import_feature)
            .collect::<Result<Vec<_>, _>>()?;
        let (target_name, target) = import_target(target)?;

        Ok(Self {
            features,
            target_name,
            target,
            len: row_count,
        })
    }

    /// Assembles a dataset from already typed columns. The target fixes the length.
    pub fn from_parts(
        features: Vec<FeatureColumn>,
        target_name: impl Into<String>,
        target: TargetValues,
    ) -> Self {
        let len = match &target {
            TargetValues::Regression(values) => values.len(),
            TargetValues::Classification { labels, .. } => labels.len(),
        };
        Self {
            features,
            target_name: target_name.into(),
            target,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The feature values of row `index`, in column order.
    pub fn row(&self, index: usize) -> Vec<FeatureValue> {
        self.features
            .iter()
            .map(|column| match &column.values {
                FeatureColumnValues::Number(v) => FeatureValue::Number(v[index]),
                FeatureColumnValues::Enum(v) => FeatureValue::Enum(v[index]),
                FeatureColumnValues::Bool(v) => FeatureValue::Bool(v[index]),
                FeatureColumnValues::Text(v) => FeatureValue::Text(v[index].clone()),
            })
            .collect()
    }
}

fn import_column(exported: ExportedArray) -> Result<(ImportedArray, ColumnType), EngineError> {
    let name = exported.name().to_string();
    let import_error = |reason: String| EngineError::Import {
        column: name.clone(),
        reason,
    };
    let imported = exported.import().map_err(|e| import_error(e.to_string()))?;
    let column_type =
        ColumnType::from_field(imported.field()).map_err(|e| import_error(e.to_string()))?;
    Ok((imported, column_type))
}

fn import_feature(exported: ExportedArray) -> Result<FeatureColumn, EngineError> {
    let (imported, column_type) = import_column(exported)?;
    let name = imported.field().name().clone();
    let array = imported.array().as_ref();

    let values = match &column_type {
        ColumnType::Number => FeatureColumnValues::Number(numeric_values(&name, array)?),
        ColumnType::Enum { variants } => {
            FeatureColumnValues::Enum(category_indices(&name, array, variants)?)
        }
        ColumnType::Bool => FeatureColumnValues::Bool(bool_values(&name, array)?),
        ColumnType::Text => FeatureColumnValues::Text(string_values(array)),
    };
    Ok(FeatureColumn {
        name,
        column_type,
        values,
    })
}

fn import_target(exported: ExportedArray) -> Result<(String, TargetValues), EngineError> {
    let (imported, column_type) = import_column(exported)?;
    let name = imported.field().name().clone();
    let array = imported.array().as_ref();
    if array.null_count() > 0 {
        return Err(EngineError::MissingTargetValues(name));
    }

    let target = match &column_type {
        ColumnType::Number => TargetValues::Regression(numeric_values(&name, array)?),
        ColumnType::Enum { variants } => TargetValues::Classification {
            variants: variants.clone(),
            labels: category_indices(&name, array, variants)?
                .into_iter()
                .flatten()
                .collect(),
        },
        ColumnType::Bool => TargetValues::Classification {
            variants: vec!["false".to_string(), "true".to_string()],
            labels: bool_values(&name, array)?
                .into_iter()
                .flatten()
                .map(usize::from)
                .collect(),
        },
        ColumnType::Text => {
            return Err(EngineError::Import {
                column: name,
                reason: "a text column cannot be a target".to_string(),
            })
        }
    };
    Ok((name, target))
}

//==================================================================================
// Typed readers
//==================================================================================

fn numeric_values(name: &str, array: &dyn Array) -> Result<Vec<f32>, EngineError> {
    let values = match array.data_type() {
        DataType::Float64 => primitive_to_f32(array.as_primitive::<Float64Type>()),
        DataType::Float32 => primitive_to_f32(array.as_primitive::<Float32Type>()),
        DataType::Int8 => primitive_to_f32(array.as_primitive::<Int8Type>()),
        DataType::Int16 => primitive_to_f32(array.as_primitive::<Int16Type>()),
        DataType::Int32 => primitive_to_f32(array.as_primitive::<Int32Type>()),
        DataType::Int64 => primitive_to_f32(array.as_primitive::<Int64Type>()),
        DataType::UInt8 => primitive_to_f32(array.as_primitive::<UInt8Type>()),
        DataType::UInt16 => primitive_to_f32(array.as_primitive::<UInt16Type>()),
        DataType::UInt32 => primitive_to_f32(array.as_primitive::<UInt32Type>()),
        DataType::UInt64 => primitive_to_f32(array.as_primitive::<UInt64Type>()),
        other => {
            return Err(EngineError::Import {
                column: name.to_string(),
                reason: format!("expected a numeric array, got {other}"),
            })
        }
    };
    Ok(values)
}

fn primitive_to_f32<T>(array: &PrimitiveArray<T>) -> Vec<f32>
where
    T: ArrowPrimitiveType,
    T::Native: ToPrimitive,
{
    array
        .iter()
        .map(|value| value.and_then(|v| v.to_f32()).unwrap_or(f32::NAN))
        .collect()
}

fn category_indices(
    name: &str,
    array: &dyn Array,
    variants: &[String],
) -> Result<Vec<Option<usize>>, EngineError> {
    let index: HashMap<&str, usize> = variants
        .iter()
        .enumerate()
        .map(|(i, v)| (v.as_str(), i))
        .collect();
    string_values(array)
        .into_iter()
        .map(|value| match value {
            None => Ok(None),
            Some(value) => index.get(value.as_str()).copied().map(Some).ok_or_else(|| {
                EngineError::Import {
                    column: name.to_string(),
                    reason: format!("'{value}' is not a declared category"),
                }
            }),
        })
        .collect()
}

fn bool_values(name: &str, array: &dyn Array) -> Result<Vec<Option<bool>>, EngineError> {
    match array.as_boolean_opt() {
        Some(booleans) => Ok(booleans.iter().collect()),
        None => Err(EngineError::Import {
            column: name.to_string(),
            reason: format!("expected a boolean array, got {}", array.data_type()),
        }),
    }
}
