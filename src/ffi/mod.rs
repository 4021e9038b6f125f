//! The Python boundary (feature `python`).
//!
//! Converts Python table objects into `TableInput`, configuration dicts into
//! `TrainingConfig`, and wraps the trained `ModelHandle` as a Python class.

pub mod python;

pub use self::python::{enable_verbose_logging_py, train_py, PyModel};
