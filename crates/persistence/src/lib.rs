//! Persistence layer for the circles sync core.
//!
//! This crate contains:
//! - The document store boundary with in-memory and PostgreSQL backends
//! - The link-field fallback resolver
//! - Repositories for users, alerts, groups, invitations and locations
//! - Live views merging store watches
//! - Store metrics

pub mod collections;
pub mod context;
pub mod db;
pub mod entities;
pub mod error;
pub mod fallback;
pub mod live;
pub mod metrics;
pub mod repositories;
pub mod store;

pub use context::CirclesContext;
pub use error::SyncError;
pub use live::LiveView;
pub use store::{DocumentStore, MemoryStore, PgDocumentStore, SharedStore, StoreError};
