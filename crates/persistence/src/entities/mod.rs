//! Row mappings for the PostgreSQL document store.

pub mod document;

pub use document::{to_data, DocumentEntity};
