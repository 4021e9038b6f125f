// In: src/bridge/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Foreign Data Bridge
// ====================================================================================
//
// The `bridge` is the only way column data crosses from the producer (tabula) to a
// consumer (the training engine, or another runtime over the Arrow C Data Interface).
// Column buffers are never copied at the boundary: the consumer borrows them.
//
// Data Flow (Export):
//
//   1. [Table Adapter (crate::table)]       -> canonical `Table`
//         |
//         `-> plan_columns(): one resolved `ColumnType` per column
//
//   2. [Column Exporter (exporter)]         -> per column, in declared order:
//         |  concat chunks -> length check -> cast to physical type -> enum check
//         |
//         `-> ExportedArray::export(): FFI_ArrowArray + FFI_ArrowSchema (+ metadata)
//
//   3. [ExportedTable]                      -> features + target, each a guard
//
// Data Flow (Import / Release):
//
//   1. [Consumer] calls `import(self)` on a guard
//         |
//         `-> from_ffi(): zero-copy view over the producer's buffers
//
//   2. [Last imported buffer] is dropped    -> producer release callback runs once,
//                                              ledger records one release
//
//   A guard that is never imported (abandoned export, error path) releases when it
//   is dropped. Every path releases exactly once; `ExportLedger` counts both sides.
//
// Three shapes are supported: `ExportedArray` (one column), `ExportedBatch` (a
// RecordBatch as one struct array) and `ExportedStream` (a RecordBatch sequence).
// ====================================================================================
pub mod exporter;
pub mod ffi_array;
pub mod ffi_stream;
pub mod ledger;

pub use exporter::{export_table, plan_columns, ColumnPlan, ExportedTable};
pub use ffi_array::{ExportedArray, ExportedBatch, ImportedArray, ImportedBatch};
pub use ffi_stream::{ExportedStream, ImportedStream};
pub use ledger::ExportLedger;
