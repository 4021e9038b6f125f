// In: src/model/predict.rs

//! Prediction inputs, options and outputs, and the conversion between them and
//! the engine's `FeatureValue` / `RawPrediction`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::{Contributions, FeatureValue, RawPrediction};
use crate::error::TabulaError;
use crate::model::ModelSchema;
use crate::types::{ColumnType, Task};

/// A single input value. `Null` is an explicitly missing value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PredictValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl PredictValue {
    fn describe(&self) -> String {
        match self {
            PredictValue::Null => "null".to_string(),
            PredictValue::Bool(b) => format!("bool {b}"),
            PredictValue::Number(n) => format!("number {n}"),
            PredictValue::String(s) => format!("string '{s}'"),
        }
    }
}

impl From<f64> for PredictValue {
    fn from(value: f64) -> Self {
        PredictValue::Number(value)
    }
}

impl From<bool> for PredictValue {
    fn from(value: bool) -> Self {
        PredictValue::Bool(value)
    }
}

impl From<&str> for PredictValue {
    fn from(value: &str) -> Self {
        PredictValue::String(value.to_string())
    }
}

/// One record to predict on: feature name to value.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct PredictInput(pub BTreeMap<String, PredictValue>);

impl PredictInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<PredictValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PredictOptions {
    /// A binary prediction is the positive class iff its probability is at least this.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default)]
    pub compute_feature_contributions: bool,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            compute_feature_contributions: false,
        }
    }
}

fn default_threshold() -> f32 {
    0.5
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredictOutput {
    Regression(RegressionPredictOutput),
    BinaryClassification(BinaryClassificationPredictOutput),
    MulticlassClassification(MulticlassClassificationPredictOutput),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegressionPredictOutput {
    pub value: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_contributions: Option<FeatureContributions>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BinaryClassificationPredictOutput {
    pub class_name: String,
    /// Probability of `class_name`.
    pub probability: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_contributions: Option<FeatureContributions>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MulticlassClassificationPredictOutput {
    pub class_name: String,
    pub probability: f32,
    pub probabilities: BTreeMap<String, f32>,
    /// Per class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_contributions: Option<BTreeMap<String, FeatureContributions>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeatureContributions {
    pub baseline_value: f32,
    pub output_value: f32,
    pub entries: Vec<FeatureContributionEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeatureContributionEntry {
    pub column_name: String,
    pub contribution: f32,
}

//==================================================================================
// Input validation
//==================================================================================

/// Checks the record against the schema and converts it to feature values in
/// schema order. Keys must match the features exactly.
pub(crate) fn prepare_row(
    schema: &ModelSchema,
    input: &PredictInput,
) -> Result<Vec<FeatureValue>, TabulaError> {
    if let Some(unknown) = input
        .0
        .keys()
        .find(|key| schema.feature(key.as_str()).is_none())
    {
        return Err(TabulaError::UnknownFeature(unknown.clone()));
    }

    schema
        .features
        .iter()
        .map(|feature| {
            let value = input
                .0
                .get(&feature.name)
                .ok_or_else(|| TabulaError::UnknownFeature(feature.name.clone()))?;
            convert_value(&feature.name, &feature.column_type, value)
        })
        .collect()
}

fn convert_value(
    column: &str,
    column_type: &ColumnType,
    value: &PredictValue,
) -> Result<FeatureValue, TabulaError> {
    let mismatch = || TabulaError::InvalidFeatureValue {
        column: column.to_string(),
        expected: column_type.name().to_string(),
        found: value.describe(),
    };

    if let PredictValue::Null = value {
        return Ok(FeatureValue::missing(column_type));
    }

    match column_type {
        ColumnType::Number => match value {
            PredictValue::Number(n) => Ok(FeatureValue::Number(*n as f32)),
            PredictValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|n| FeatureValue::Number(n as f32))
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ColumnType::Bool => match value {
            PredictValue::Bool(b) => Ok(FeatureValue::Bool(Some(*b))),
            PredictValue::String(s) if s == "true" || s == "false" => {
                Ok(FeatureValue::Bool(Some(s == "true")))
            }
            _ => Err(mismatch()),
        },
        ColumnType::Enum { variants } => {
            let category = scalar_string(value);
            variants
                .iter()
                .position(|v| *v == category)
                .map(|index| FeatureValue::Enum(Some(index)))
                .ok_or_else(|| TabulaError::InvalidCategory {
                    column: column.to_string(),
                    value: category,
                })
        }
        ColumnType::Text => Ok(FeatureValue::Text(Some(scalar_string(value)))),
    }
}

/// Integral numbers render without a fraction, as exported numeric categories do.
fn scalar_string(value: &PredictValue) -> String {
    match value {
        PredictValue::String(s) => s.clone(),
        PredictValue::Number(n) => n.to_string(),
        PredictValue::Bool(b) => b.to_string(),
        PredictValue::Null => String::new(),
    }
}

//==================================================================================
// Output assembly
//==================================================================================

pub(crate) fn build_output(
    schema: &ModelSchema,
    raw: RawPrediction,
    options: &PredictOptions,
) -> Result<PredictOutput, TabulaError> {
    match (schema.task, raw) {
        (Task::Regression, RawPrediction::Regression { value, contributions }) => {
            Ok(PredictOutput::Regression(RegressionPredictOutput {
                value,
                feature_contributions: contributions.map(|c| named_contributions(schema, c)),
            }))
        }
        (
            Task::BinaryClassification,
            RawPrediction::Classification {
                probabilities,
                contributions,
            },
        ) => {
            let variants = schema.target_variants();
            let (negative, positive) = match (variants.first(), variants.get(1), probabilities.get(1)) {
                (Some(negative), Some(positive), Some(&p)) => ((negative, 1.0 - p), (positive, p)),
                _ => return Err(engine_shape_error(schema)),
            };
            let (class_name, probability) = if positive.1 >= options.threshold {
                positive
            } else {
                negative
            };
            Ok(PredictOutput::BinaryClassification(BinaryClassificationPredictOutput {
                class_name: class_name.clone(),
                probability,
                feature_contributions: contributions
                    .and_then(|c| c.into_iter().next())
                    .map(|c| named_contributions(schema, c)),
            }))
        }
        (
            Task::MulticlassClassification,
            RawPrediction::Classification {
                probabilities,
                contributions,
            },
        ) => {
            let variants = schema.target_variants();
            if variants.len() != probabilities.len() {
                return Err(engine_shape_error(schema));
            }
            let best = crate::metrics::argmax(&probabilities);
            Ok(PredictOutput::MulticlassClassification(
                MulticlassClassificationPredictOutput {
                    class_name: variants[best].clone(),
                    probability: probabilities[best],
                    probabilities: variants.iter().cloned().zip(probabilities).collect(),
                    feature_contributions: contributions.map(|per_class| {
                        variants
                            .iter()
                            .cloned()
                            .zip(per_class)
                            .map(|(class, c)| (class, named_contributions(schema, c)))
                            .collect()
                    }),
                },
            ))
        }
        (task, _) => Err(TabulaError::EngineFailure(format!(
            "engine returned a prediction that does not fit a {task} model"
        ))),
    }
}

fn engine_shape_error(schema: &ModelSchema) -> TabulaError {
    TabulaError::EngineFailure(format!(
        "engine returned probabilities that do not match the classes of '{}'",
        schema.target
    ))
}

fn named_contributions(schema: &ModelSchema, contributions: Contributions) -> FeatureContributions {
    let output_value = contributions.output();
    FeatureContributions {
        baseline_value: contributions.baseline,
        output_value,
        entries: schema
            .features
            .iter()
            .zip(contributions.values)
            .map(|(feature, contribution)| FeatureContributionEntry {
                column_name: feature.name.clone(),
                contribution,
            })
            .collect(),
    }
}
