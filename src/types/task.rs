//! The kind of model a target column implies.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TabulaError;
use crate::types::ColumnType;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Regression,
    BinaryClassification,
    MulticlassClassification,
}

impl Task {
    /// Derives the task from the target column's logical type.
    ///
    /// Number targets regress; enum and bool targets classify, binary when there
    /// are exactly two variants. Text targets are rejected.
    pub fn for_target(target: &str, column_type: &ColumnType) -> Result<Self, TabulaError> {
        match column_type {
            ColumnType::Number => Ok(Task::Regression),
            ColumnType::Bool => Ok(Task::BinaryClassification),
            ColumnType::Enum { variants } if variants.len() == 2 => Ok(Task::BinaryClassification),
            ColumnType::Enum { variants } if variants.len() > 2 => {
                Ok(Task::MulticlassClassification)
            }
            other => Err(TabulaError::InvalidConfig(format!(
                "target column '{target}' of type {other} cannot be trained on"
            ))),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Task::Regression => "regression",
            Task::BinaryClassification => "binary classification",
            Task::MulticlassClassification => "multiclass classification",
        };
        write!(f, "{name}")
    }
}
