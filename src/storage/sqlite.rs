//! SQLite persistence adapter
//!
//! The one concrete `StorageAdapter` backend. Holds its connection behind a
//! mutex; every public operation is a single physical statement (or a
//! statement plus a lookup), so no cross-call transaction state exists.

use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::models::{MatchType, MigrationRecord, Note};
use super::adapter::{StorageAdapter, StorageError};
use super::migrations::{builtin_migrations, MigrationRunner};

/// SQLite-backed storage adapter
pub struct SqliteAdapter {
    conn: Mutex<Connection>,
}

impl SqliteAdapter {
    /// Open (or create) the database file and apply the declarative schema.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening notes database at {:?}", path);
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Self::prepare(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Self::prepare(conn)
    }

    fn prepare(conn: Connection) -> Result<Self, StorageError> {
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(|e| StorageError::Connection(format!("Failed to enable foreign keys: {}", e)))?;
        conn.execute_batch(include_str!("schema.sql"))
            .map_err(|e| StorageError::Migration(format!("Failed to apply schema: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn row_to_note(row: &Row) -> rusqlite::Result<Note> {
        let match_type_str: String = row.get(2)?;
        let created_at_str: String = row.get(5)?;
        let updated_at_str: String = row.get(6)?;

        Ok(Note {
            id: row.get(0)?,
            pattern: row.get(1)?,
            match_type: MatchType::parse(&match_type_str).unwrap_or_default(),
            note: row.get(3)?,
            original_email: row.get(4)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    fn query_duplicate(
        conn: &Connection,
        pattern: &str,
        match_type: MatchType,
        exclude_id: Option<&str>,
    ) -> Result<Option<Note>, StorageError> {
        let result = conn.query_row(
            "SELECT id, pattern, match_type, note, original_email, created_at, updated_at
             FROM notes
             WHERE pattern = ?1 AND match_type = ?2 AND (?3 IS NULL OR id <> ?3)",
            params![pattern, match_type.as_str(), exclude_id],
            Self::row_to_note,
        );

        match result {
            Ok(note) => Ok(Some(note)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::from(e)),
        }
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl StorageAdapter for SqliteAdapter {
    async fn get_all_notes(&self) -> Result<HashMap<String, Note>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, pattern, match_type, note, original_email, created_at, updated_at
             FROM notes",
        )?;
        let rows = stmt.query_map([], Self::row_to_note)?;

        let mut notes = HashMap::new();
        for row in rows {
            let note = row?;
            notes.insert(note.id.clone(), note);
        }
        Ok(notes)
    }

    async fn get_note_by_id(&self, id: &str) -> Result<Option<Note>, StorageError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT id, pattern, match_type, note, original_email, created_at, updated_at
             FROM notes WHERE id = ?",
            [id],
            Self::row_to_note,
        );

        match result {
            Ok(note) => Ok(Some(note)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::from(e)),
        }
    }

    async fn save_note(&self, note: Note) -> Result<Note, StorageError> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO notes (id, pattern, match_type, note, original_email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                pattern = excluded.pattern,
                match_type = excluded.match_type,
                note = excluded.note,
                original_email = excluded.original_email,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            params![
                note.id,
                note.pattern,
                note.match_type.as_str(),
                note.note,
                note.original_email,
                note.created_at.to_rfc3339(),
                note.updated_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {
                debug!("Saved note {} ({})", note.id, note.pattern);
                Ok(note)
            }
            // The unique (pattern, match_type) index rejected the write:
            // another note already owns this pattern.
            Err(ref e) if is_constraint_violation(e) => {
                let existing =
                    Self::query_duplicate(&conn, &note.pattern, note.match_type, Some(&note.id))?;
                Err(StorageError::Duplicate {
                    existing_note_id: existing.map(|n| n.id).unwrap_or_default(),
                })
            }
            Err(e) => Err(StorageError::from(e)),
        }
    }

    async fn delete_note(&self, id: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let count = conn.execute("DELETE FROM notes WHERE id = ?", [id])?;
        debug!("Deleted note {} (rows: {})", id, count);
        Ok(())
    }

    async fn find_notes_by_email(&self, email: &str) -> Result<Vec<Note>, StorageError> {
        let conn = self.lock()?;
        // rowid order gives the insertion-order tie-break inside a
        // priority tier; the stable sort below only reorders across tiers.
        let mut stmt = conn.prepare(
            "SELECT id, pattern, match_type, note, original_email, created_at, updated_at
             FROM notes ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], Self::row_to_note)?;

        let mut matches = Vec::new();
        for row in rows {
            let note = row?;
            if note.matches(email) {
                matches.push(note);
            }
        }
        matches.sort_by_key(|n| n.match_type.priority());
        Ok(matches)
    }

    async fn find_duplicate(
        &self,
        pattern: &str,
        match_type: MatchType,
        exclude_id: Option<&str>,
    ) -> Result<Option<Note>, StorageError> {
        let conn = self.lock()?;
        Self::query_duplicate(&conn, pattern, match_type, exclude_id)
    }

    async fn get_templates(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT body_json FROM templates WHERE id = 1",
            [],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(Vec::new()),
            Err(e) => Err(StorageError::from(e)),
        }
    }

    async fn save_templates(&self, templates: Vec<String>) -> Result<(), StorageError> {
        let body = serde_json::to_string(&templates)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO templates (id, body_json) VALUES (1, ?)",
            [body],
        )?;
        Ok(())
    }

    async fn get_settings(&self) -> Result<Option<serde_json::Value>, StorageError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT body_json FROM settings WHERE id = 1",
            [],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::from(e)),
        }
    }

    async fn save_settings(&self, settings: serde_json::Value) -> Result<(), StorageError> {
        let body = serde_json::to_string(&settings)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (id, body_json) VALUES (1, ?)",
            [body],
        )?;
        Ok(())
    }

    async fn get_migration_records(&self) -> Result<Vec<MigrationRecord>, StorageError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, description, applied_at FROM migrations ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let applied_at_str: String = row.get(2)?;
            Ok(MigrationRecord {
                id: row.get(0)?,
                description: row.get(1)?,
                applied_at: parse_timestamp(&applied_at_str),
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    async fn record_migration(&self, record: MigrationRecord) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO migrations (id, description, applied_at) VALUES (?1, ?2, ?3)",
            params![record.id, record.description, record.applied_at.to_rfc3339()],
        )?;
        Ok(())
    }

    async fn delete_migration_record(&self, id: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM migrations WHERE id = ?", [id])?;
        Ok(())
    }
}

/// Open the database at `path`, apply the schema, and run all builtin data
/// migrations. Called once at startup, before the repository serves requests.
pub async fn open_database(path: &Path) -> Result<Arc<SqliteAdapter>, StorageError> {
    let adapter = Arc::new(SqliteAdapter::open(path)?);

    let mut runner = MigrationRunner::new(adapter.clone());
    runner.register_all(builtin_migrations())?;
    let summary = runner.run_pending().await?;
    if !summary.success {
        return Err(StorageError::Migration(summary.errors.join("; ")));
    }
    if !summary.applied.is_empty() {
        info!("Applied migrations: {:?}", summary.applied);
    }

    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::generate_note_id;
    use tempfile::tempdir;

    fn note(pattern: &str, match_type: MatchType) -> Note {
        let now = Utc::now();
        Note {
            id: generate_note_id(),
            pattern: pattern.to_string(),
            match_type,
            note: "test".to_string(),
            original_email: pattern.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_open_new_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.sqlite");
        let result = open_database(&path).await;
        assert!(result.is_ok());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_save_and_get_roundtrip() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        let saved = adapter.save_note(note("alice@example.com", MatchType::Exact)).await.unwrap();

        let fetched = adapter.get_note_by_id(&saved.id).await.unwrap().unwrap();
        assert_eq!(fetched.pattern, "alice@example.com");
        assert_eq!(fetched.match_type, MatchType::Exact);
        assert_eq!(fetched.note, "test");

        assert!(adapter.get_note_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicate_pattern() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        let first = adapter.save_note(note("alice@example.com", MatchType::Exact)).await.unwrap();

        let err = adapter
            .save_note(note("alice@example.com", MatchType::Exact))
            .await
            .unwrap_err();
        match err {
            StorageError::Duplicate { existing_note_id } => {
                assert_eq!(existing_note_id, first.id);
            }
            other => panic!("unexpected error: {}", other),
        }

        // Same pattern under a different match type is allowed.
        adapter
            .save_note(note("alice@example.com", MatchType::Contains))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upsert_same_id_is_not_a_duplicate() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        let mut saved = adapter.save_note(note("alice@example.com", MatchType::Exact)).await.unwrap();
        saved.note = "updated".to_string();
        adapter.save_note(saved.clone()).await.unwrap();

        let fetched = adapter.get_note_by_id(&saved.id).await.unwrap().unwrap();
        assert_eq!(fetched.note, "updated");
        assert_eq!(adapter.get_all_notes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_match_ordering_ignores_insertion_order() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        // Inserted broadest first.
        adapter.save_note(note("example.com", MatchType::Contains)).await.unwrap();
        adapter.save_note(note("@example.com", MatchType::EndsWith)).await.unwrap();
        adapter.save_note(note("alice@", MatchType::StartsWith)).await.unwrap();
        adapter.save_note(note("alice@example.com", MatchType::Exact)).await.unwrap();

        let matches = adapter.find_notes_by_email("alice@example.com").await.unwrap();
        let types: Vec<MatchType> = matches.iter().map(|n| n.match_type).collect();
        assert_eq!(
            types,
            vec![
                MatchType::Exact,
                MatchType::StartsWith,
                MatchType::EndsWith,
                MatchType::Contains
            ]
        );
    }

    #[tokio::test]
    async fn test_find_duplicate_respects_exclude_id() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        let saved = adapter.save_note(note("alice@example.com", MatchType::Exact)).await.unwrap();

        let hit = adapter
            .find_duplicate("alice@example.com", MatchType::Exact, None)
            .await
            .unwrap();
        assert_eq!(hit.unwrap().id, saved.id);

        let excluded = adapter
            .find_duplicate("alice@example.com", MatchType::Exact, Some(&saved.id))
            .await
            .unwrap();
        assert!(excluded.is_none());
    }

    #[tokio::test]
    async fn test_delete_note_missing_is_noop() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        adapter.delete_note("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_templates_whole_list_replace() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        assert!(adapter.get_templates().await.unwrap().is_empty());

        adapter
            .save_templates(vec!["Thanks!".to_string(), "Noted.".to_string()])
            .await
            .unwrap();
        assert_eq!(adapter.get_templates().await.unwrap().len(), 2);

        adapter.save_templates(vec!["Only one".to_string()]).await.unwrap();
        assert_eq!(adapter.get_templates().await.unwrap(), vec!["Only one"]);
    }

    #[tokio::test]
    async fn test_settings_record() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        assert!(adapter.get_settings().await.unwrap().is_none());

        adapter
            .save_settings(serde_json::json!({"showBanner": false}))
            .await
            .unwrap();
        let stored = adapter.get_settings().await.unwrap().unwrap();
        assert_eq!(stored["showBanner"], false);
    }

    #[tokio::test]
    async fn test_migration_log() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        assert!(adapter.get_migration_records().await.unwrap().is_empty());

        adapter
            .record_migration(MigrationRecord {
                id: "001_test".to_string(),
                description: "test".to_string(),
                applied_at: Utc::now(),
            })
            .await
            .unwrap();
        let records = adapter.get_migration_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "001_test");

        adapter.delete_migration_record("001_test").await.unwrap();
        assert!(adapter.get_migration_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.sqlite");
        {
            let adapter = open_database(&path).await.unwrap();
            adapter.save_note(note("alice@example.com", MatchType::Exact)).await.unwrap();
        }
        let adapter = open_database(&path).await.unwrap();
        assert_eq!(adapter.get_all_notes().await.unwrap().len(), 1);
    }
}
