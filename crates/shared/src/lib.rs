//! Shared utilities and common types for the circles sync core.
//!
//! This crate provides common functionality used across all other crates:
//! - Schema-less document type with defensive field accessors
//! - Timestamp parsing across stored representations
//! - Coordinate and accuracy validation
//! - Document id and group code generation

pub mod codes;
pub mod document;
pub mod time;
pub mod validation;

pub use document::{Document, Fields};
