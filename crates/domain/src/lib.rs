//! Domain layer for the circles sync core.
//!
//! This crate contains:
//! - Canonical models (Alert, UnifiedGroup, Location, Invitation, Account)
//! - Raw stored shapes and their normalizers
//! - Pure services: ordering, alert stats, the precision gate

pub mod models;
pub mod schema;
pub mod services;
