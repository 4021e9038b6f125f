// In: src/bridge/exporter.rs

//! Turns a canonical `Table` into exported FFI columns.
//!
//! Two steps: `plan_columns` resolves one logical `ColumnType` per train column
//! (override first, inference second), and `export_table` walks a table in plan
//! order, materializes each column as one contiguous array, coerces it to the
//! type's physical Arrow form and exports it with the type attached as field
//! metadata. The same plan is used for the train and the test table.

use arrow::array::{new_empty_array, Array, ArrayRef};
use arrow::compute::{can_cast_types, cast_with_options, concat, CastOptions};
use arrow::datatypes::{DataType, Field};
use hashbrown::HashSet;

use crate::bridge::ffi_array::ExportedArray;
use crate::bridge::ledger::ExportLedger;
use crate::config::ColumnTypeOverride;
use crate::error::TabulaError;
use crate::table::{Column, Table};
use crate::types::column_type::{number_strings, string_values};
use crate::types::ColumnType;

/// The resolved logical type of one train column. `None` means the Arrow type
/// has no logical counterpart; exporting such a column fails.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub name: String,
    pub column_type: Option<ColumnType>,
}

/// A table after export: features in declared order, the target separately.
#[derive(Debug)]
pub struct ExportedTable {
    pub features: Vec<ExportedArray>,
    pub target: ExportedArray,
    pub row_count: usize,
}

impl ExportedTable {
    pub fn feature_names(&self) -> Vec<&str> {
        self.features.iter().map(ExportedArray::name).collect()
    }
}

/// Resolves column types for every column of the train table.
///
/// Every override must name a column of the table.
pub fn plan_columns(
    table: &Table,
    overrides: &[ColumnTypeOverride],
) -> Result<Vec<ColumnPlan>, TabulaError> {
    if let Some(unknown) = overrides.iter().find(|o| table.column(&o.name).is_none()) {
        return Err(TabulaError::UnknownColumnOverride(unknown.name.clone()));
    }

    Ok(table
        .columns()
        .iter()
        .map(|column| {
            let column_type = match overrides.iter().find(|o| o.name == column.name()) {
                Some(column_override) => Some(column_override.column_type.clone()),
                None => ColumnType::infer(column.data_type(), column.chunks()),
            };
            ColumnPlan {
                name: column.name().to_string(),
                column_type,
            }
        })
        .collect())
}

/// Exports `table` column by column, following `plan`.
///
/// A column of the plan that the table lacks fails with `MissingTargetColumn`
/// for the target and `TestSchemaMismatch` otherwise. Columns the table has
/// beyond the plan are not exported. If any column fails, the columns already
/// exported are released before the error is returned.
pub fn export_table(
    table: &Table,
    plan: &[ColumnPlan],
    target: &str,
    ledger: &ExportLedger,
) -> Result<ExportedTable, TabulaError> {
    if !plan.iter().any(|p| p.name == target) {
        return Err(TabulaError::MissingTargetColumn(target.to_string()));
    }

    let row_count = table.row_count();
    let mut features = Vec::with_capacity(plan.len().saturating_sub(1));
    let mut exported_target = None;

    for column_plan in plan {
        let column = table.column(&column_plan.name).ok_or_else(|| {
            if column_plan.name == target {
                TabulaError::MissingTargetColumn(target.to_string())
            } else {
                TabulaError::TestSchemaMismatch(column_plan.name.clone())
            }
        })?;
        let exported = export_column(column, column_plan.column_type.as_ref(), row_count, ledger)?;
        if column_plan.name == target {
            exported_target = Some(exported);
        } else {
            features.push(exported);
        }
    }

    let planned: HashSet<&str> = plan.iter().map(|p| p.name.as_str()).collect();
    for extra in table.column_names().into_iter().filter(|n| !planned.contains(n)) {
        log::debug!("Column '{}' is not part of the training schema, skipping", extra);
    }

    let target = exported_target.ok_or_else(|| TabulaError::MissingTargetColumn(target.to_string()))?;
    Ok(ExportedTable {
        features,
        target,
        row_count,
    })
}

fn export_column(
    column: &Column,
    column_type: Option<&ColumnType>,
    row_count: usize,
    ledger: &ExportLedger,
) -> Result<ExportedArray, TabulaError> {
    let column_type = column_type.ok_or_else(|| TabulaError::ExportFailure {
        column: column.name().to_string(),
        reason: format!("no logical column type for Arrow type {}", column.data_type()),
    })?;

    let materialized = materialize(column)?;
    if materialized.len() != row_count {
        return Err(TabulaError::ColumnLengthMismatch {
            column: column.name().to_string(),
            expected: row_count,
            found: materialized.len(),
        });
    }

    let physical = coerce(column.name(), &materialized, column_type)?;
    if let ColumnType::Enum { variants } = column_type {
        check_categories(column.name(), physical.as_ref(), variants)?;
    }

    let field = Field::new(column.name(), physical.data_type().clone(), true)
        .with_metadata(column_type.to_metadata()?);
    log::debug!(
        "Exporting column '{}' as {} ({} -> {}, {} chunk(s))",
        column.name(),
        column_type,
        column.data_type(),
        physical.data_type(),
        column.chunks().len()
    );
    ExportedArray::export(&field, &physical, ledger)
}

/// Combines a column's chunks, in order, into one contiguous array.
fn materialize(column: &Column) -> Result<ArrayRef, TabulaError> {
    match column.chunks() {
        [] => Ok(new_empty_array(column.data_type())),
        [single] => Ok(single.clone()),
        chunks => {
            let refs: Vec<&dyn Array> = chunks.iter().map(|chunk| chunk.as_ref()).collect();
            Ok(concat(&refs)?)
        }
    }
}

/// Casts `array` to the physical form of `column_type`, unless it already is.
fn coerce(name: &str, array: &ArrayRef, column_type: &ColumnType) -> Result<ArrayRef, TabulaError> {
    let target_type = column_type.physical_type();
    if array.data_type() == &target_type {
        return Ok(array.clone());
    }
    if !column_type.accepts_physical(array.data_type())
        && !can_cast_types(array.data_type(), &target_type)
    {
        return Err(TabulaError::ExportFailure {
            column: name.to_string(),
            reason: format!("cannot represent {} as {}", array.data_type(), column_type),
        });
    }

    // Numbers read as categories or text use the same rendering as predict inputs.
    if target_type == DataType::Utf8 {
        if let Some(strings) = number_strings(array.as_ref()) {
            return Ok(strings);
        }
    }

    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(array, &target_type, &options).map_err(|e| TabulaError::ExportFailure {
        column: name.to_string(),
        reason: e.to_string(),
    })
}

fn check_categories(name: &str, array: &dyn Array, variants: &[String]) -> Result<(), TabulaError> {
    let allowed: HashSet<&str> = variants.iter().map(String::as_str).collect();
    match string_values(array)
        .into_iter()
        .flatten()
        .find(|value| !allowed.contains(value.as_str()))
    {
        Some(value) => Err(TabulaError::InvalidCategory {
            column: name.to_string(),
            value,
        }),
        None => Ok(()),
    }
}
