//! This module defines the canonical, type-safe logical column type used
//! throughout the tabula bridge, and how it maps onto Arrow.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, ArrowPrimitiveType, AsArray, PrimitiveArray, StringArray};
use arrow::datatypes::{
    DataType as ArrowDataType, Field, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::error::TabulaError;

/// The field metadata key under which the resolved column type travels with
/// the exported schema.
pub const COLUMN_TYPE_METADATA_KEY: &str = "tabula.column_type";

/// A string column with at most this many distinct non-null values is inferred
/// as an enum; above it, the column is treated as free text.
pub const ENUM_MAX_UNIQUE_VALUES: usize = 100;

/// The logical type of a column, as the training engine sees it.
///
/// `Enum` variants are ordered; their order is the category index used by the
/// engine and, for a binary target, the second variant is the positive class.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnType {
    Number,
    Enum { variants: Vec<String> },
    Bool,
    Text,
}

impl ColumnType {
    /// Infers a logical type from a column's Arrow type and its chunks.
    ///
    /// Returns `None` for Arrow types with no logical counterpart (lists,
    /// structs, binary, ...). Those columns are rejected when exported.
    pub fn infer(data_type: &ArrowDataType, chunks: &[ArrayRef]) -> Option<Self> {
        match data_type {
            dt if dt.is_numeric() => Some(Self::Number),
            ArrowDataType::Boolean => Some(Self::Bool),
            ArrowDataType::Dictionary(_, value_type)
                if matches!(value_type.as_ref(), ArrowDataType::Utf8 | ArrowDataType::LargeUtf8) =>
            {
                Some(Self::Enum {
                    variants: dictionary_variants(chunks),
                })
            }
            ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 => Some(infer_string_column(chunks)),
            _ => None,
        }
    }

    /// The lowercase name used in configuration and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Enum { .. } => "enum",
            Self::Bool => "bool",
            Self::Text => "text",
        }
    }

    /// Returns `true` if an array of `data_type` can be exported for this
    /// logical type as-is, without a cast.
    pub fn accepts_physical(&self, data_type: &ArrowDataType) -> bool {
        match self {
            Self::Number => data_type.is_numeric(),
            Self::Bool => matches!(data_type, ArrowDataType::Boolean),
            Self::Enum { .. } | Self::Text => match data_type {
                ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 => true,
                ArrowDataType::Dictionary(_, value_type) => {
                    matches!(value_type.as_ref(), ArrowDataType::Utf8 | ArrowDataType::LargeUtf8)
                }
                _ => false,
            },
        }
    }

    /// The Arrow type a column is cast to when `accepts_physical` is false.
    pub fn physical_type(&self) -> ArrowDataType {
        match self {
            Self::Number => ArrowDataType::Float64,
            Self::Bool => ArrowDataType::Boolean,
            Self::Enum { .. } | Self::Text => ArrowDataType::Utf8,
        }
    }

    /// The category list of an enum-like column. `Bool` behaves as the
    /// two-variant enum `["false", "true"]`.
    pub fn variants(&self) -> Option<Vec<String>> {
        match self {
            Self::Enum { variants } => Some(variants.clone()),
            Self::Bool => Some(vec!["false".to_string(), "true".to_string()]),
            Self::Number | Self::Text => None,
        }
    }

    /// Builds the field metadata map that carries this type across the boundary.
    pub fn to_metadata(&self) -> Result<HashMap<String, String>, TabulaError> {
        let mut metadata = HashMap::new();
        metadata.insert(
            COLUMN_TYPE_METADATA_KEY.to_string(),
            serde_json::to_string(self)?,
        );
        Ok(metadata)
    }

    /// Reads the logical type back from an imported field.
    ///
    /// Fields without the metadata key fall back to inference from the Arrow
    /// type alone (string columns then become `Text`).
    pub fn from_field(field: &Field) -> Result<Self, TabulaError> {
        if let Some(json) = field.metadata().get(COLUMN_TYPE_METADATA_KEY) {
            return Ok(serde_json::from_str(json)?);
        }
        match field.data_type() {
            dt if dt.is_numeric() => Ok(Self::Number),
            ArrowDataType::Boolean => Ok(Self::Bool),
            ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 | ArrowDataType::Dictionary(_, _) => {
                Ok(Self::Text)
            }
            dt => Err(TabulaError::ExportFailure {
                column: field.name().clone(),
                reason: format!("no logical column type for Arrow type {dt}"),
            }),
        }
    }
}

/// Provides the canonical string representation for a `ColumnType`.
impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enum { variants } => write!(f, "enum[{}]", variants.join(",")),
            other => write!(f, "{}", other.name()),
        }
    }
}

//==================================================================================
// Inference helpers
//==================================================================================

fn dictionary_variants(chunks: &[ArrayRef]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut variants = Vec::new();
    for chunk in chunks {
        let Some(dictionary) = chunk.as_any_dictionary_opt() else {
            continue;
        };
        for value in string_values(dictionary.values().as_ref()).into_iter().flatten() {
            if seen.insert(value.clone()) {
                variants.push(value);
            }
        }
    }
    variants
}

fn infer_string_column(chunks: &[ArrayRef]) -> ColumnType {
    let mut unique = HashSet::new();
    for chunk in chunks {
        for value in string_values(chunk.as_ref()).into_iter().flatten() {
            unique.insert(value);
            if unique.len() > ENUM_MAX_UNIQUE_VALUES {
                return ColumnType::Text;
            }
        }
    }
    let mut variants: Vec<String> = unique.into_iter().collect();
    variants.sort();
    ColumnType::Enum { variants }
}

/// Reads a Utf8 or LargeUtf8 array into owned strings. Other types yield nothing.
pub(crate) fn string_values(array: &dyn Array) -> Vec<Option<String>> {
    match array.data_type() {
        ArrowDataType::Utf8 => array
            .as_string::<i32>()
            .iter()
            .map(|v| v.map(str::to_string))
            .collect(),
        ArrowDataType::LargeUtf8 => array
            .as_string::<i64>()
            .iter()
            .map(|v| v.map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Renders a numeric array as strings, the way a number reads as a category or
/// as text everywhere in the crate: integral floats print without a fractional
/// part (`1.0` as "1"). Returns `None` for non-numeric types.
pub(crate) fn number_strings(array: &dyn Array) -> Option<ArrayRef> {
    let strings = match array.data_type() {
        ArrowDataType::Float64 => display_strings(array.as_primitive::<Float64Type>()),
        ArrowDataType::Float32 => display_strings(array.as_primitive::<Float32Type>()),
        ArrowDataType::Int8 => display_strings(array.as_primitive::<Int8Type>()),
        ArrowDataType::Int16 => display_strings(array.as_primitive::<Int16Type>()),
        ArrowDataType::Int32 => display_strings(array.as_primitive::<Int32Type>()),
        ArrowDataType::Int64 => display_strings(array.as_primitive::<Int64Type>()),
        ArrowDataType::UInt8 => display_strings(array.as_primitive::<UInt8Type>()),
        ArrowDataType::UInt16 => display_strings(array.as_primitive::<UInt16Type>()),
        ArrowDataType::UInt32 => display_strings(array.as_primitive::<UInt32Type>()),
        ArrowDataType::UInt64 => display_strings(array.as_primitive::<UInt64Type>()),
        _ => return None,
    };
    Some(Arc::new(strings))
}

fn display_strings<T>(array: &PrimitiveArray<T>) -> StringArray
where
    T: ArrowPrimitiveType,
    T::Native: fmt::Display,
{
    array.iter().map(|v| v.map(|v| v.to_string())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        BooleanArray, DictionaryArray, Float64Array, Int32Array, ListArray, StringArray,
    };

    #[test]
    fn test_infer_numeric_and_bool() {
        let ints: ArrayRef = Arc::new(Int32Array::from(vec![1, 2, 3]));
        let floats: ArrayRef = Arc::new(Float64Array::from(vec![0.5]));
        let bools: ArrayRef = Arc::new(BooleanArray::from(vec![true, false]));
        assert_eq!(
            ColumnType::infer(&ArrowDataType::Int32, &[ints]),
            Some(ColumnType::Number)
        );
        assert_eq!(
            ColumnType::infer(&ArrowDataType::Float64, &[floats]),
            Some(ColumnType::Number)
        );
        assert_eq!(
            ColumnType::infer(&ArrowDataType::Boolean, &[bools]),
            Some(ColumnType::Bool)
        );
    }

    #[test]
    fn test_infer_low_cardinality_strings_as_sorted_enum() {
        let chunk_a: ArrayRef = Arc::new(StringArray::from(vec![Some("y"), None, Some("x")]));
        let chunk_b: ArrayRef = Arc::new(StringArray::from(vec!["y", "z"]));
        let inferred = ColumnType::infer(&ArrowDataType::Utf8, &[chunk_a, chunk_b]);
        assert_eq!(
            inferred,
            Some(ColumnType::Enum {
                variants: vec!["x".into(), "y".into(), "z".into()]
            })
        );
    }

    #[test]
    fn test_infer_high_cardinality_strings_as_text() {
        let values: Vec<String> = (0..=ENUM_MAX_UNIQUE_VALUES).map(|i| format!("v{i}")).collect();
        let chunk: ArrayRef = Arc::new(StringArray::from(values));
        assert_eq!(
            ColumnType::infer(&ArrowDataType::Utf8, &[chunk]),
            Some(ColumnType::Text)
        );
    }

    #[test]
    fn test_infer_dictionary_keeps_dictionary_order() {
        let dictionary: DictionaryArray<Int8Type> = vec!["b", "a", "b"].into_iter().collect();
        let chunk: ArrayRef = Arc::new(dictionary);
        let inferred = ColumnType::infer(chunk.data_type(), &[chunk.clone()]);
        assert_eq!(
            inferred,
            Some(ColumnType::Enum {
                variants: vec!["b".into(), "a".into()]
            })
        );
    }

    #[test]
    fn test_infer_rejects_nested_types() {
        let list = ListArray::from_iter_primitive::<Int32Type, _, _>(vec![Some(vec![Some(1)])]);
        let chunk: ArrayRef = Arc::new(list);
        assert_eq!(ColumnType::infer(chunk.data_type(), &[chunk.clone()]), None);
    }

    #[test]
    fn test_metadata_roundtrip_through_field() {
        let column_type = ColumnType::Enum {
            variants: vec!["pos".into(), "neg".into()],
        };
        let field = Field::new("target", ArrowDataType::Utf8, true)
            .with_metadata(column_type.to_metadata().unwrap());
        assert_eq!(ColumnType::from_field(&field).unwrap(), column_type);
    }

    #[test]
    fn test_override_json_shape() {
        let parsed: ColumnType =
            serde_json::from_str(r#"{"type":"enum","variants":["x","y"]}"#).unwrap();
        assert_eq!(parsed.to_string(), "enum[x,y]");
        let number: ColumnType = serde_json::from_str(r#"{"type":"number"}"#).unwrap();
        assert_eq!(number, ColumnType::Number);
    }
}
