//! Storage adapter contract
//!
//! Callers (the notes repository and the migration runner) depend only on
//! this trait, never on a concrete backend. Any method a backend does not
//! override fails with `NotImplemented`, a contract-violation signal for
//! development rather than a production error path.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::{MatchType, MigrationRecord, Note};

/// Storage error type
#[derive(Debug)]
pub enum StorageError {
    /// An adapter method the concrete backend never implemented.
    NotImplemented(&'static str),
    Connection(String),
    Query(String),
    Json(String),
    Migration(String),
    /// Unique-constraint conflict on (pattern, matchType).
    Duplicate { existing_note_id: String },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotImplemented(method) => {
                write!(f, "Adapter method not implemented: {}", method)
            }
            StorageError::Connection(msg) => write!(f, "Connection failed: {}", msg),
            StorageError::Query(msg) => write!(f, "Query failed: {}", msg),
            StorageError::Json(msg) => write!(f, "JSON parse error: {}", msg),
            StorageError::Migration(msg) => write!(f, "Migration failed: {}", msg),
            StorageError::Duplicate { existing_note_id } => {
                write!(f, "Duplicate pattern (existing note {})", existing_note_id)
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Json(err.to_string())
    }
}

/// Capability set any persistence backend must satisfy.
///
/// All methods are async and may suspend at I/O boundaries. Reads report
/// absence as `None`/empty, never as an error; deletes are no-ops when the
/// target is already gone.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// All notes keyed by id. No ordering guarantee.
    async fn get_all_notes(&self) -> Result<HashMap<String, Note>, StorageError> {
        Err(StorageError::NotImplemented("get_all_notes"))
    }

    async fn get_note_by_id(&self, _id: &str) -> Result<Option<Note>, StorageError> {
        Err(StorageError::NotImplemented("get_note_by_id"))
    }

    /// Upsert keyed by `note.id`. Fails with `StorageError::Duplicate` when
    /// another note already holds the same (pattern, matchType).
    async fn save_note(&self, _note: Note) -> Result<Note, StorageError> {
        Err(StorageError::NotImplemented("save_note"))
    }

    async fn delete_note(&self, _id: &str) -> Result<(), StorageError> {
        Err(StorageError::NotImplemented("delete_note"))
    }

    /// All notes matching `email`, ordered exact > startsWith > endsWith >
    /// contains, insertion order within a tier.
    async fn find_notes_by_email(&self, _email: &str) -> Result<Vec<Note>, StorageError> {
        Err(StorageError::NotImplemented("find_notes_by_email"))
    }

    /// The one note sharing (pattern, matchType) other than `exclude_id`.
    async fn find_duplicate(
        &self,
        _pattern: &str,
        _match_type: MatchType,
        _exclude_id: Option<&str>,
    ) -> Result<Option<Note>, StorageError> {
        Err(StorageError::NotImplemented("find_duplicate"))
    }

    async fn get_templates(&self) -> Result<Vec<String>, StorageError> {
        Err(StorageError::NotImplemented("get_templates"))
    }

    /// Whole-list replace.
    async fn save_templates(&self, _templates: Vec<String>) -> Result<(), StorageError> {
        Err(StorageError::NotImplemented("save_templates"))
    }

    /// The persisted settings record, if any. Typed resolution happens in
    /// the repository layer; storage treats the record as opaque JSON.
    async fn get_settings(&self) -> Result<Option<serde_json::Value>, StorageError> {
        Err(StorageError::NotImplemented("get_settings"))
    }

    /// Whole-record replace.
    async fn save_settings(&self, _settings: serde_json::Value) -> Result<(), StorageError> {
        Err(StorageError::NotImplemented("save_settings"))
    }

    // Migration log. Written only by the migration runner, kept separate
    // from business data.

    async fn get_migration_records(&self) -> Result<Vec<MigrationRecord>, StorageError> {
        Err(StorageError::NotImplemented("get_migration_records"))
    }

    async fn record_migration(&self, _record: MigrationRecord) -> Result<(), StorageError> {
        Err(StorageError::NotImplemented("record_migration"))
    }

    async fn delete_migration_record(&self, _id: &str) -> Result<(), StorageError> {
        Err(StorageError::NotImplemented("delete_migration_record"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BareAdapter;

    #[async_trait]
    impl StorageAdapter for BareAdapter {}

    #[tokio::test]
    async fn test_unimplemented_method_signals_contract_violation() {
        let adapter = BareAdapter;
        let err = adapter.get_all_notes().await.unwrap_err();
        match err {
            StorageError::NotImplemented(method) => assert_eq!(method, "get_all_notes"),
            other => panic!("unexpected error: {}", other),
        }
    }
}
