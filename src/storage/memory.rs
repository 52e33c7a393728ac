//! In-memory storage adapter
//!
//! Backs unit tests and any host without durable storage. Keeps notes in
//! insertion order so multi-match tie-breaking behaves like the SQLite
//! backend's rowid ordering.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::models::{MatchType, MigrationRecord, Note};
use super::adapter::{StorageAdapter, StorageError};

#[derive(Default)]
struct MemoryState {
    notes: Vec<Note>,
    templates: Vec<String>,
    settings: Option<serde_json::Value>,
    migrations: Vec<MigrationRecord>,
}

/// Volatile `StorageAdapter` backend.
#[derive(Default)]
pub struct MemoryAdapter {
    state: Mutex<MemoryState>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn get_all_notes(&self) -> Result<HashMap<String, Note>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .notes
            .iter()
            .map(|n| (n.id.clone(), n.clone()))
            .collect())
    }

    async fn get_note_by_id(&self, id: &str) -> Result<Option<Note>, StorageError> {
        let state = self.lock()?;
        Ok(state.notes.iter().find(|n| n.id == id).cloned())
    }

    async fn save_note(&self, note: Note) -> Result<Note, StorageError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .notes
            .iter()
            .find(|n| n.pattern == note.pattern && n.match_type == note.match_type && n.id != note.id)
        {
            return Err(StorageError::Duplicate {
                existing_note_id: existing.id.clone(),
            });
        }

        match state.notes.iter_mut().find(|n| n.id == note.id) {
            // Updates keep their slot, preserving insertion order.
            Some(slot) => *slot = note.clone(),
            None => state.notes.push(note.clone()),
        }
        Ok(note)
    }

    async fn delete_note(&self, id: &str) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.notes.retain(|n| n.id != id);
        Ok(())
    }

    async fn find_notes_by_email(&self, email: &str) -> Result<Vec<Note>, StorageError> {
        let state = self.lock()?;
        let mut matches: Vec<Note> = state
            .notes
            .iter()
            .filter(|n| n.matches(email))
            .cloned()
            .collect();
        matches.sort_by_key(|n| n.match_type.priority());
        Ok(matches)
    }

    async fn find_duplicate(
        &self,
        pattern: &str,
        match_type: MatchType,
        exclude_id: Option<&str>,
    ) -> Result<Option<Note>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .notes
            .iter()
            .find(|n| {
                n.pattern == pattern
                    && n.match_type == match_type
                    && exclude_id != Some(n.id.as_str())
            })
            .cloned())
    }

    async fn get_templates(&self) -> Result<Vec<String>, StorageError> {
        let state = self.lock()?;
        Ok(state.templates.clone())
    }

    async fn save_templates(&self, templates: Vec<String>) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.templates = templates;
        Ok(())
    }

    async fn get_settings(&self) -> Result<Option<serde_json::Value>, StorageError> {
        let state = self.lock()?;
        Ok(state.settings.clone())
    }

    async fn save_settings(&self, settings: serde_json::Value) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.settings = Some(settings);
        Ok(())
    }

    async fn get_migration_records(&self) -> Result<Vec<MigrationRecord>, StorageError> {
        let state = self.lock()?;
        Ok(state.migrations.clone())
    }

    async fn record_migration(&self, record: MigrationRecord) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if state.migrations.iter().any(|r| r.id == record.id) {
            return Err(StorageError::Query(format!(
                "Migration record {} already exists",
                record.id
            )));
        }
        state.migrations.push(record);
        Ok(())
    }

    async fn delete_migration_record(&self, id: &str) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.migrations.retain(|r| r.id != id);
        Ok(())
    }
}
