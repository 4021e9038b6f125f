// In: src/table/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Table Adapter
// ====================================================================================
//
// Callers hand us tables in one of two families:
//
//   Family A  [RecordFrame]   row/attribute-oriented records (one map per row)
//   Family B  [ChunkedTable]  Arrow schema + per-column chunk lists
//
// The boundary (Rust caller or the Python layer) decides the family ONCE and wraps
// the value in a `TableInput`. There is no probing or fallback past that point.
// Both families normalize to the same canonical `Table`: an ordered list of named
// `Column`s, each a list of Arrow chunks, all summing to one row count.
//
//   TableInput --normalize()--> Table --(bridge::exporter)--> ExportedTable
//
// Normalization is pure. It clones `Arc`s and builds new arrays; it never mutates
// the caller's value.
// ====================================================================================

pub mod chunked;
pub mod records;

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use hashbrown::HashSet;

use crate::error::TabulaError;

pub use chunked::ChunkedTable;
pub use records::RecordFrame;

//==================================================================================
// I. Canonical Table
//==================================================================================

/// Which source family a `Table` was normalized from. Kept for diagnostics only;
/// downstream code never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Records,
    Chunked,
}

/// One named column, possibly stored as several contiguous chunks.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    data_type: DataType,
    chunks: Vec<ArrayRef>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, chunks: Vec<ArrayRef>) -> Self {
        Self {
            name: name.into(),
            data_type,
            chunks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn chunks(&self) -> &[ArrayRef] {
        &self.chunks
    }

    /// Total number of values across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The canonical, normalized table. Column names are unique and every column has
/// exactly `row_count` values.
#[derive(Debug, Clone)]
pub struct Table {
    kind: TableKind,
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    /// Validates and assembles a table. The first column fixes the row count.
    pub fn try_new(kind: TableKind, columns: Vec<Column>) -> Result<Self, TabulaError> {
        let first = columns.first().ok_or(TabulaError::EmptyTable)?;
        let row_count = first.len();

        {
            let mut seen = HashSet::new();
            for column in &columns {
                if !seen.insert(column.name()) {
                    return Err(TabulaError::DuplicateColumn(column.name().to_string()));
                }
            }
        }

        for column in &columns {
            for chunk in column.chunks() {
                if chunk.data_type() != column.data_type() {
                    return Err(TabulaError::ChunkTypeMismatch {
                        column: column.name().to_string(),
                        expected: column.data_type().to_string(),
                        found: chunk.data_type().to_string(),
                    });
                }
            }
            if column.len() != row_count {
                return Err(TabulaError::ColumnLengthMismatch {
                    column: column.name().to_string(),
                    expected: row_count,
                    found: column.len(),
                });
            }
        }

        Ok(Self {
            kind,
            columns,
            row_count,
        })
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name() == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }
}

//==================================================================================
// II. Boundary Input
//==================================================================================

/// A table-like value as it arrives from the caller, classified once.
#[derive(Debug, Clone)]
pub enum TableInput {
    /// Family A: row/attribute-oriented records.
    Records(RecordFrame),
    /// Family B: chunked columnar Arrow data.
    Chunked(ChunkedTable),
    /// Something the boundary could not classify. `type_name` describes it.
    Foreign { type_name: String },
}

impl TableInput {
    pub fn foreign(type_name: impl Into<String>) -> Self {
        Self::Foreign {
            type_name: type_name.into(),
        }
    }

    /// A short description of the representation, used in error messages.
    pub fn kind_name(&self) -> String {
        match self {
            Self::Records(_) => "a record frame".to_string(),
            Self::Chunked(_) => "a chunked Arrow table".to_string(),
            Self::Foreign { type_name } => type_name.clone(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Foreign { .. })
    }

    /// Normalizes the input into the canonical `Table`.
    pub fn normalize(&self) -> Result<Table, TabulaError> {
        match self {
            Self::Records(frame) => Table::try_new(TableKind::Records, frame.to_columns()?),
            Self::Chunked(table) => Table::try_new(TableKind::Chunked, table.to_columns()?),
            Self::Foreign { type_name } => Err(TabulaError::UnsupportedTableKind {
                found: type_name.clone(),
            }),
        }
    }
}

impl From<RecordFrame> for TableInput {
    fn from(frame: RecordFrame) -> Self {
        Self::Records(frame)
    }
}

impl From<ChunkedTable> for TableInput {
    fn from(table: ChunkedTable) -> Self {
        Self::Chunked(table)
    }
}

impl From<RecordBatch> for TableInput {
    fn from(batch: RecordBatch) -> Self {
        Self::Chunked(ChunkedTable::from(batch))
    }
}

/// Resolves a train table and an optional test table.
///
/// The two are validated independently: the test table does not have to share the
/// train table's family, but if it is present it must be recognized.
pub fn resolve_tables(
    train: &TableInput,
    test: Option<&TableInput>,
) -> Result<(Table, Option<Table>), TabulaError> {
    if !train.is_recognized() {
        return Err(TabulaError::UnsupportedTableKind {
            found: train.kind_name(),
        });
    }
    if let Some(test) = test {
        if !test.is_recognized() {
            return Err(TabulaError::InconsistentTableKinds {
                train: train.kind_name(),
                test: test.kind_name(),
            });
        }
    }

    let train_table = train.normalize()?;
    let test_table = test.map(TableInput::normalize).transpose()?;
    log::debug!(
        "Resolved train table ({:?}, {} rows, {} columns), test table: {}",
        train_table.kind(),
        train_table.row_count(),
        train_table.columns().len(),
        test_table
            .as_ref()
            .map_or("absent".to_string(), |t| format!("{} rows", t.row_count()))
    );
    Ok((train_table, test_table))
}

#[cfg(test)]
mod tests;
