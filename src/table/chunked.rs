//! Family B: chunked columnar Arrow tables.
//!
//! Each column is a list of Arrow arrays. Unlike a sequence of `RecordBatch`es,
//! chunk boundaries may differ from column to column, the way a pyarrow
//! `ChunkedArray` is laid out.

use arrow::array::ArrayRef;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::error::TabulaError;
use crate::table::Column;

#[derive(Debug, Clone)]
pub struct ChunkedTable {
    schema: SchemaRef,
    columns: Vec<Vec<ArrayRef>>,
}

impl ChunkedTable {
    /// Builds a table from a schema and one chunk list per schema field.
    pub fn try_new(schema: SchemaRef, columns: Vec<Vec<ArrayRef>>) -> Result<Self, TabulaError> {
        if columns.len() != schema.fields().len() {
            return Err(TabulaError::InvalidConfig(format!(
                "chunked table has {} chunk lists for {} schema fields",
                columns.len(),
                schema.fields().len()
            )));
        }
        Ok(Self { schema, columns })
    }

    /// Builds a table whose chunks are the columns of a sequence of batches.
    pub fn from_batches(schema: SchemaRef, batches: &[RecordBatch]) -> Result<Self, TabulaError> {
        let mut columns = vec![Vec::with_capacity(batches.len()); schema.fields().len()];
        for batch in batches {
            if batch.num_columns() != columns.len() {
                return Err(TabulaError::InvalidConfig(format!(
                    "record batch has {} columns, schema declares {}",
                    batch.num_columns(),
                    columns.len()
                )));
            }
            for (chunks, array) in columns.iter_mut().zip(batch.columns()) {
                chunks.push(array.clone());
            }
        }
        Self::try_new(schema, columns)
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn chunks(&self, index: usize) -> Option<&[ArrayRef]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    pub(crate) fn to_columns(&self) -> Result<Vec<Column>, TabulaError> {
        Ok(self
            .schema
            .fields()
            .iter()
            .zip(&self.columns)
            .map(|(field, chunks)| {
                Column::new(field.name().clone(), field.data_type().clone(), chunks.clone())
            })
            .collect())
    }
}

impl From<RecordBatch> for ChunkedTable {
    fn from(batch: RecordBatch) -> Self {
        let schema = batch.schema();
        let columns = batch.columns().iter().map(|c| vec![c.clone()]).collect();
        Self { schema, columns }
    }
}
