//! Schema/data migration engine
//!
//! Applies registered migrations exactly once, in ascending id order, and
//! tracks applied state in the adapter's durable migration log so re-running
//! is idempotent across restarts and upgrades.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::models::MigrationRecord;
use super::adapter::{StorageAdapter, StorageError};

/// A versioned unit of schema/data transformation.
///
/// Ids follow `NNN_description`; the zero-padded sequence number makes
/// lexicographic order equal application order.
#[async_trait]
pub trait Migration: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    async fn up(&self, adapter: &dyn StorageAdapter) -> Result<(), StorageError>;

    /// Whether this migration can be rolled back.
    fn has_down(&self) -> bool {
        false
    }

    async fn down(&self, _adapter: &dyn StorageAdapter) -> Result<(), StorageError> {
        Err(StorageError::Migration(format!(
            "Migration {} has no down step",
            self.id()
        )))
    }
}

/// Outcome of a `run_pending` batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub success: bool,
    pub applied: Vec<String>,
    /// At most one entry: the batch halts on the first failure.
    pub errors: Vec<String>,
}

/// Applied/pending breakdown for diagnostic surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub applied_count: usize,
    pub pending_count: usize,
    pub applied: Vec<String>,
    pub pending: Vec<String>,
}

/// Sequences and tracks migrations against one storage adapter.
pub struct MigrationRunner {
    adapter: Arc<dyn StorageAdapter>,
    registered: Vec<Arc<dyn Migration>>,
}

impl MigrationRunner {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            registered: Vec::new(),
        }
    }

    /// Register a migration, keeping the list sorted by id.
    pub fn register(&mut self, migration: Arc<dyn Migration>) -> Result<(), StorageError> {
        let id = migration.id().to_string();
        match self.registered.binary_search_by(|m| m.id().cmp(&id.as_str())) {
            Ok(_) => Err(StorageError::Migration(format!(
                "Migration {} is already registered",
                id
            ))),
            Err(pos) => {
                self.registered.insert(pos, migration);
                Ok(())
            }
        }
    }

    pub fn register_all(
        &mut self,
        migrations: impl IntoIterator<Item = Arc<dyn Migration>>,
    ) -> Result<(), StorageError> {
        for migration in migrations {
            self.register(migration)?;
        }
        Ok(())
    }

    pub async fn is_applied(&self, id: &str) -> Result<bool, StorageError> {
        let records = self.adapter.get_migration_records().await?;
        Ok(records.iter().any(|r| r.id == id))
    }

    /// Applied records, most recent first.
    pub async fn applied_migrations(&self) -> Result<Vec<MigrationRecord>, StorageError> {
        let mut records = self.adapter.get_migration_records().await?;
        records.sort_by(|a, b| {
            b.applied_at
                .cmp(&a.applied_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(records)
    }

    /// Apply all registered-but-unapplied migrations in ascending id order.
    ///
    /// Each successful migration is durably recorded before the next one
    /// starts, so a crash mid-sequence never leaves an applied-but-unrecorded
    /// migration. The first failure halts the batch; no migration may assume
    /// a skipped predecessor ran.
    pub async fn run_pending(&self) -> Result<MigrationSummary, StorageError> {
        let applied: HashSet<String> = self
            .adapter
            .get_migration_records()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let mut summary = MigrationSummary {
            success: true,
            applied: Vec::new(),
            errors: Vec::new(),
        };

        for migration in &self.registered {
            let id = migration.id();
            if applied.contains(id) {
                continue;
            }

            info!("Applying migration {}: {}", id, migration.description());
            match migration.up(self.adapter.as_ref()).await {
                Ok(()) => {
                    self.adapter
                        .record_migration(MigrationRecord {
                            id: id.to_string(),
                            description: migration.description().to_string(),
                            applied_at: Utc::now(),
                        })
                        .await?;
                    summary.applied.push(id.to_string());
                }
                Err(e) => {
                    error!("Migration {} failed: {}", id, e);
                    summary.success = false;
                    summary.errors.push(format!("{}: {}", id, e));
                    break;
                }
            }
        }

        Ok(summary)
    }

    /// Roll back the most recently applied migration.
    ///
    /// Returns the rolled-back id, or `None` when nothing has been applied
    /// (not an error). The applied-record is deleted only after `down`
    /// succeeds.
    pub async fn rollback_last(&self) -> Result<Option<String>, StorageError> {
        let Some(last) = self.applied_migrations().await?.into_iter().next() else {
            return Ok(None);
        };

        let migration = self
            .registered
            .iter()
            .find(|m| m.id() == last.id)
            .ok_or_else(|| {
                StorageError::Migration(format!(
                    "Migration {} is applied but not registered",
                    last.id
                ))
            })?;

        if !migration.has_down() {
            return Err(StorageError::Migration(format!(
                "Migration {} has no down step",
                last.id
            )));
        }

        warn!("Rolling back migration {}", last.id);
        migration.down(self.adapter.as_ref()).await?;
        self.adapter.delete_migration_record(&last.id).await?;
        Ok(Some(last.id))
    }

    pub async fn status(&self) -> Result<MigrationStatus, StorageError> {
        let applied: HashSet<String> = self
            .adapter
            .get_migration_records()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let mut applied_ids: Vec<String> = applied.iter().cloned().collect();
        applied_ids.sort();
        let pending: Vec<String> = self
            .registered
            .iter()
            .filter(|m| !applied.contains(m.id()))
            .map(|m| m.id().to_string())
            .collect();

        Ok(MigrationStatus {
            applied_count: applied_ids.len(),
            pending_count: pending.len(),
            applied: applied_ids,
            pending,
        })
    }
}

// Builtin data migrations. The declarative schema (schema.sql) is applied by
// the adapter itself; these run on top of it through the adapter contract.

/// 001: lowercase every stored pattern. Notes written before normalization
/// was enforced may carry mixed-case patterns that silently never match.
struct NormalizePatterns;

#[async_trait]
impl Migration for NormalizePatterns {
    fn id(&self) -> &str {
        "001_normalize_patterns"
    }

    fn description(&self) -> &str {
        "Lowercase all stored note patterns"
    }

    async fn up(&self, adapter: &dyn StorageAdapter) -> Result<(), StorageError> {
        for (_, note) in adapter.get_all_notes().await? {
            let lowered = note.pattern.to_lowercase();
            if lowered != note.pattern {
                let mut fixed = note;
                fixed.pattern = lowered;
                adapter.save_note(fixed).await?;
            }
        }
        Ok(())
    }
}

/// 002: fill empty originalEmail fields from the pattern so provenance is
/// never blank on notes created before the field existed.
struct BackfillOriginalEmail;

#[async_trait]
impl Migration for BackfillOriginalEmail {
    fn id(&self) -> &str {
        "002_backfill_original_email"
    }

    fn description(&self) -> &str {
        "Backfill originalEmail from the pattern where empty"
    }

    async fn up(&self, adapter: &dyn StorageAdapter) -> Result<(), StorageError> {
        for (_, note) in adapter.get_all_notes().await? {
            if note.original_email.is_empty() {
                let mut fixed = note;
                fixed.original_email = fixed.pattern.clone();
                adapter.save_note(fixed).await?;
            }
        }
        Ok(())
    }
}

/// The crate's migrations, in application order.
pub fn builtin_migrations() -> Vec<Arc<dyn Migration>> {
    vec![Arc::new(NormalizePatterns), Arc::new(BackfillOriginalEmail)]
}
