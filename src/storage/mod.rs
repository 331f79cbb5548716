//! Storage Layer - SQLite-backed persistence
//!
//! One table per resource kind, generated from the kind descriptors:
//! - resource_id, tenant_id, created_at, updated_at on every table
//! - metadata (JSON key/value list) on hierarchical kinds
//! - one column per scalar field and per forward relationship

pub mod rows;
pub mod schema;
pub mod sqlite;

pub use rows::Window;
pub use sqlite::{DbStats, SqliteStore};
