//! This module defines the core, strongly-typed column representations used
//! throughout the tabula bridge.
//!
//! It currently includes the canonical `ColumnType` enum, which is the logical
//! type a column carries across the boundary (number, enum, bool, text), the
//! inference rules that derive it from an Arrow `DataType`, and the `Task` a
//! target column implies.

pub mod column_type;
pub mod task;

// Re-export the main type(s) for easier access.
pub use column_type::{ColumnType, COLUMN_TYPE_METADATA_KEY, ENUM_MAX_UNIQUE_VALUES};
pub use task::Task;
