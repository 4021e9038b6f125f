// In: src/bridge/ffi_stream.rs

//! A sequence of record batches exported through the Arrow C Stream Interface.

use std::fmt;

use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::ffi_stream::{ArrowArrayStreamReader, FFI_ArrowArrayStream};
use arrow::record_batch::{RecordBatch, RecordBatchIterator, RecordBatchReader};

use crate::bridge::ledger::{ExportLedger, Lease};
use crate::error::TabulaError;

pub struct ExportedStream {
    stream: FFI_ArrowArrayStream,
    lease: Lease,
}

impl ExportedStream {
    /// Exports an arbitrary reader. Batches are produced lazily on the receiver side.
    pub fn export(reader: Box<dyn RecordBatchReader + Send>, ledger: &ExportLedger) -> Self {
        Self {
            stream: FFI_ArrowArrayStream::new(reader),
            lease: ledger.acquire(),
        }
    }

    /// Exports a fixed list of batches sharing `schema`.
    pub fn from_batches(
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        ledger: &ExportLedger,
    ) -> Self {
        let reader = RecordBatchIterator::new(batches.into_iter().map(Ok), schema);
        Self::export(Box::new(reader), ledger)
    }

    pub fn import(self) -> Result<ImportedStream, TabulaError> {
        let reader = ArrowArrayStreamReader::try_new(self.stream)?;
        Ok(ImportedStream {
            reader,
            _lease: self.lease,
        })
    }
}

/// The receiver-side reader. Dropping it releases the stream.
pub struct ImportedStream {
    reader: ArrowArrayStreamReader,
    _lease: Lease,
}

impl ImportedStream {
    pub fn schema(&self) -> SchemaRef {
        self.reader.schema()
    }

    /// Drains the remaining batches.
    pub fn collect_batches(self) -> Result<Vec<RecordBatch>, TabulaError> {
        Ok(self.collect::<Result<Vec<_>, ArrowError>>()?)
    }
}

impl Iterator for ImportedStream {
    type Item = Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next()
    }
}

impl fmt::Debug for ExportedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedStream").finish_non_exhaustive()
    }
}

impl fmt::Debug for ImportedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportedStream")
            .field("schema", &self.schema())
            .finish_non_exhaustive()
    }
}
