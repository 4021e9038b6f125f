// In: src/engine/features.rs

//! Encodes typed feature columns into the dense `f32` matrix the reference
//! models train on.
//!
//! Number columns are standardized (missing values land on the mean, i.e. zero),
//! enum and bool columns are one-hot encoded (missing values encode as all
//! zeros), and text columns are ignored.

use ndarray::{Array1, Array2};

use crate::engine::dataset::{Dataset, FeatureColumnValues};
use crate::engine::{EngineError, FeatureValue};

#[derive(Debug, Clone, PartialEq)]
enum ColumnEncoding {
    Standardized { mean: f32, std: f32 },
    OneHot { n_variants: usize },
    Ignored,
}

impl ColumnEncoding {
    fn width(&self) -> usize {
        match self {
            ColumnEncoding::Standardized { .. } => 1,
            ColumnEncoding::OneHot { n_variants } => *n_variants,
            ColumnEncoding::Ignored => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEncoder {
    encodings: Vec<ColumnEncoding>,
    /// For each encoded column, the index of the feature it came from.
    sources: Vec<usize>,
}

impl FeatureEncoder {
    /// Fits the encoding statistics on `dataset`.
    pub fn fit(dataset: &Dataset) -> Self {
        let encodings: Vec<ColumnEncoding> = dataset
            .features
            .iter()
            .map(|column| match &column.values {
                FeatureColumnValues::Number(values) => {
                    let (mean, std) = mean_and_std(values);
                    ColumnEncoding::Standardized { mean, std }
                }
                FeatureColumnValues::Enum(_) => ColumnEncoding::OneHot {
                    n_variants: column.column_type.variants().map_or(0, |v| v.len()),
                },
                FeatureColumnValues::Bool(_) => ColumnEncoding::OneHot { n_variants: 2 },
                FeatureColumnValues::Text(_) => {
                    log::info!(
                        "Text column '{}' is not used by the reference models",
                        column.name
                    );
                    ColumnEncoding::Ignored
                }
            })
            .collect();

        let sources = encodings
            .iter()
            .enumerate()
            .flat_map(|(feature, encoding)| std::iter::repeat(feature).take(encoding.width()))
            .collect();
        Self { encodings, sources }
    }

    /// Number of encoded columns.
    pub fn width(&self) -> usize {
        self.sources.len()
    }

    /// Number of source features.
    pub fn n_features(&self) -> usize {
        self.encodings.len()
    }

    pub fn encode_row(&self, row: &[FeatureValue]) -> Result<Array1<f32>, EngineError> {
        if row.len() != self.encodings.len() {
            return Err(EngineError::FeatureCountMismatch {
                expected: self.encodings.len(),
                found: row.len(),
            });
        }
        let mut encoded = Array1::zeros(self.width());
        let mut offset = 0;
        for (encoding, value) in self.encodings.iter().zip(row) {
            match (encoding, value) {
                (ColumnEncoding::Standardized { mean, std }, FeatureValue::Number(v)) => {
                    if !v.is_nan() {
                        encoded[offset] = (v - mean) / std;
                    }
                }
                (ColumnEncoding::OneHot { n_variants }, FeatureValue::Enum(Some(index))) => {
                    if index < n_variants {
                        encoded[offset + index] = 1.0;
                    }
                }
                (ColumnEncoding::OneHot { .. }, FeatureValue::Bool(Some(flag))) => {
                    encoded[offset + usize::from(*flag)] = 1.0;
                }
                // Missing values and ignored columns stay zero.
                _ => {}
            }
            offset += encoding.width();
        }
        Ok(encoded)
    }

    pub fn encode_dataset(&self, dataset: &Dataset) -> Result<Array2<f32>, EngineError> {
        let mut matrix = Array2::zeros((dataset.len(), self.width()));
        for (index, mut matrix_row) in matrix.rows_mut().into_iter().enumerate() {
            matrix_row.assign(&self.encode_row(&dataset.row(index))?);
        }
        Ok(matrix)
    }

    /// Sums per-encoded-column contributions back onto their source features.
    pub fn aggregate(&self, encoded: &[f32]) -> Vec<f32> {
        let mut per_feature = vec![0.0; self.n_features()];
        for (&source, &value) in self.sources.iter().zip(encoded) {
            per_feature[source] += value;
        }
        per_feature
    }
}

fn mean_and_std(values: &[f32]) -> (f32, f32) {
    let present: Vec<f64> = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|&v| v as f64)
        .collect();
    if present.is_empty() {
        return (0.0, 1.0);
    }
    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    (mean as f32, if std > 0.0 { std as f32 } else { 1.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dataset::{FeatureColumn, TargetValues};
    use crate::types::ColumnType;

    fn dataset() -> Dataset {
        Dataset::from_parts(
            vec![
                FeatureColumn {
                    name: "n".into(),
                    column_type: ColumnType::Number,
                    values: FeatureColumnValues::Number(vec![1.0, 3.0, f32::NAN]),
                },
                FeatureColumn {
                    name: "e".into(),
                    column_type: ColumnType::Enum {
                        variants: vec!["x".into(), "y".into(), "z".into()],
                    },
                    values: FeatureColumnValues::Enum(vec![Some(2), None, Some(0)]),
                },
                FeatureColumn {
                    name: "t".into(),
                    column_type: ColumnType::Text,
                    values: FeatureColumnValues::Text(vec![None, None, None]),
                },
            ],
            "target",
            TargetValues::Regression(vec![0.0, 1.0, 2.0]),
        )
    }

    #[test]
    fn test_encode_dataset_layout() {
        let data = dataset();
        let encoder = FeatureEncoder::fit(&data);
        assert_eq!(encoder.width(), 4);
        assert_eq!(encoder.n_features(), 3);

        let matrix = encoder.encode_dataset(&data).unwrap();
        // mean 2, std 1
        assert_eq!(matrix.row(0).to_vec(), vec![-1.0, 0.0, 0.0, 1.0]);
        assert_eq!(matrix.row(1).to_vec(), vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(matrix.row(2).to_vec(), vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_aggregate_sums_one_hot_columns() {
        let encoder = FeatureEncoder::fit(&dataset());
        assert_eq!(encoder.aggregate(&[0.5, 1.0, 2.0, 3.0]), vec![0.5, 6.0, 0.0]);
    }

    #[test]
    fn test_encode_row_checks_width() {
        let encoder = FeatureEncoder::fit(&dataset());
        let result = encoder.encode_row(&[FeatureValue::Number(1.0)]);
        assert!(matches!(
            result,
            Err(EngineError::FeatureCountMismatch {
                expected: 3,
                found: 1
            })
        ));
    }
}
