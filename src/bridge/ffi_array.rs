// In: src/bridge/ffi_array.rs

//! Single-column and whole-batch exports through the Arrow C Data Interface.
//!
//! `ExportedArray` and `ExportedBatch` own a paired `FFI_ArrowArray` and
//! `FFI_ArrowSchema`. The producer-side release callback runs when the FFI
//! array is dropped: either directly (abandoned export) or when the last buffer
//! of the imported array goes away (imported export). The export's `Lease` is
//! dropped right after that callback in both cases, so the ledger counts the
//! release itself, not the guard.

use std::ptr::NonNull;
use std::sync::Arc;

use arrow::alloc::Allocation;
use arrow::array::{make_array, Array, ArrayData, ArrayRef, StructArray};
use arrow::buffer::{BooleanBuffer, Buffer, NullBuffer};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::ffi::{from_ffi, FFI_ArrowArray, FFI_ArrowSchema};
use arrow::record_batch::RecordBatch;

use crate::bridge::ledger::{ExportLedger, Lease};
use crate::error::TabulaError;

//==================================================================================
// I. Single Column
//==================================================================================

/// One exported column: its buffers and a self-describing schema.
#[derive(Debug)]
pub struct ExportedArray {
    name: String,
    len: usize,
    array: FFI_ArrowArray,
    schema: FFI_ArrowSchema,
    lease: Lease,
}

impl ExportedArray {
    /// Exports `array` under `field`. The field's name and metadata travel with
    /// the schema; its data type must match the array.
    pub fn export(
        field: &Field,
        array: &ArrayRef,
        ledger: &ExportLedger,
    ) -> Result<Self, TabulaError> {
        if field.data_type() != array.data_type() {
            return Err(TabulaError::ExportFailure {
                column: field.name().clone(),
                reason: format!(
                    "field declares {} but the array is {}",
                    field.data_type(),
                    array.data_type()
                ),
            });
        }
        let schema =
            FFI_ArrowSchema::try_from(field).map_err(|e| TabulaError::ExportFailure {
                column: field.name().clone(),
                reason: e.to_string(),
            })?;
        let ffi_array = FFI_ArrowArray::new(&array.to_data());

        Ok(Self {
            name: field.name().clone(),
            len: array.len(),
            array: ffi_array,
            schema,
            lease: ledger.acquire(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Receiver side: borrows the exported buffers without copying them.
    ///
    /// Consumes the export, so a second import of the same struct cannot exist.
    pub fn import(self) -> Result<ImportedArray, TabulaError> {
        let Self {
            array,
            schema,
            lease,
            ..
        } = self;
        let field = Field::try_from(&schema)?;
        // SAFETY: `array` and `schema` were produced together in `export` from the
        // same `ArrayData`, and `array` is moved into `from_ffi` exactly once.
        let data = unsafe { from_ffi(array, &schema) }?;
        Ok(ImportedArray {
            field,
            array: make_array(bind_lease(data, lease)?),
        })
    }
}

/// A column on the receiver side of the boundary.
///
/// The export is released when the last reference to its buffers goes away:
/// dropping this guard is enough unless a clone of `array()` is still held.
#[derive(Debug)]
pub struct ImportedArray {
    field: Field,
    array: ArrayRef,
}

impl ImportedArray {
    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn array(&self) -> &ArrayRef {
        &self.array
    }
}

//==================================================================================
// Release tracking
//==================================================================================

/// Owns every buffer of one import, then its lease. Field order is drop order:
/// the buffers (and with them the producer's release callback) go first.
#[derive(Debug)]
struct ImportOwner {
    _buffers: Vec<Buffer>,
    _lease: Lease,
}

/// Re-points every buffer of `data` at one shared `ImportOwner`, so the lease
/// drops exactly when the last imported buffer does.
fn bind_lease(data: ArrayData, lease: Lease) -> Result<ArrayData, ArrowError> {
    let mut buffers = Vec::new();
    collect_buffers(&data, &mut buffers);
    let owner: Arc<dyn Allocation> = Arc::new(ImportOwner {
        _buffers: buffers,
        _lease: lease,
    });
    rebind(&data, &owner)
}

fn collect_buffers(data: &ArrayData, out: &mut Vec<Buffer>) {
    out.extend(data.buffers().iter().cloned());
    if let Some(nulls) = data.nulls() {
        out.push(nulls.buffer().clone());
    }
    for child in data.child_data() {
        collect_buffers(child, out);
    }
}

fn rebind(data: &ArrayData, owner: &Arc<dyn Allocation>) -> Result<ArrayData, ArrowError> {
    let buffers = data
        .buffers()
        .iter()
        .map(|buffer| rebind_buffer(buffer, owner))
        .collect();
    let nulls = data.nulls().map(|nulls| {
        let buffer = rebind_buffer(nulls.buffer(), owner);
        NullBuffer::new(BooleanBuffer::new(buffer, nulls.offset(), nulls.len()))
    });
    let children = data
        .child_data()
        .iter()
        .map(|child| rebind(child, owner))
        .collect::<Result<Vec<_>, _>>()?;

    ArrayData::builder(data.data_type().clone())
        .len(data.len())
        .offset(data.offset())
        .buffers(buffers)
        .nulls(nulls)
        .child_data(children)
        .build()
}

fn rebind_buffer(buffer: &Buffer, owner: &Arc<dyn Allocation>) -> Buffer {
    match NonNull::new(buffer.as_ptr() as *mut u8) {
        // SAFETY: `owner` holds a clone of `buffer`, so the memory stays valid and
        // unchanged for as long as any buffer created here is alive.
        Some(ptr) => unsafe { Buffer::from_custom_allocation(ptr, buffer.len(), Arc::clone(owner)) },
        None => buffer.clone(),
    }
}

//==================================================================================
// II. Whole Batch (one-shot paired array + schema)
//==================================================================================

/// A `RecordBatch` exported as a single struct array.
#[derive(Debug)]
pub struct ExportedBatch {
    num_rows: usize,
    array: FFI_ArrowArray,
    schema: FFI_ArrowSchema,
    lease: Lease,
}

impl ExportedBatch {
    pub fn export(batch: &RecordBatch, ledger: &ExportLedger) -> Result<Self, TabulaError> {
        let schema = FFI_ArrowSchema::try_from(batch.schema().as_ref())?;
        let struct_array = StructArray::from(batch.clone());
        let array = FFI_ArrowArray::new(&struct_array.to_data());
        Ok(Self {
            num_rows: batch.num_rows(),
            array,
            schema,
            lease: ledger.acquire(),
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn import(self) -> Result<ImportedBatch, TabulaError> {
        let Self {
            array,
            schema,
            lease,
            ..
        } = self;
        // SAFETY: produced together in `export`, consumed once here.
        let data = unsafe { from_ffi(array, &schema) }?;
        let (fields, columns, _nulls) = StructArray::from(bind_lease(data, lease)?).into_parts();
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok(ImportedBatch { batch })
    }
}

/// Released when the last column of the batch (or a clone of one) is dropped.
#[derive(Debug)]
pub struct ImportedBatch {
    batch: RecordBatch,
}

impl ImportedBatch {
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }
}
