//! Storage module
//!
//! This module provides:
//! - The `StorageAdapter` capability contract any backend must satisfy
//! - The SQLite adapter (the production backend) and an in-memory adapter
//! - The schema/data migration runner and builtin migration registry

pub mod adapter;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use adapter::{StorageAdapter, StorageError};
pub use memory::MemoryAdapter;
pub use migrations::{builtin_migrations, Migration, MigrationRunner, MigrationStatus, MigrationSummary};
pub use sqlite::{open_database, SqliteAdapter};
