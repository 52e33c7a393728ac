//! Sender-notes storage core.
//!
//! Attaches free-text notes to sender email addresses and matches incoming
//! messages against stored patterns. The crate is the persistence and
//! business-rule layer of an email-client add-on: a pluggable storage
//! adapter, a versioned migration runner, the notes repository façade, and
//! the named action protocol the UI layers call through.
//!
//! Typical startup:
//!
//! ```no_run
//! # async fn start() -> Result<(), mailnotes::StorageError> {
//! let adapter = mailnotes::open_database(std::path::Path::new("notes.sqlite")).await?;
//! let repo = mailnotes::NotesRepository::new(adapter);
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod models;
pub mod repository;
pub mod storage;

pub use actions::dispatch;
pub use models::{MatchType, MigrationRecord, Note, NoteDraft, Settings};
pub use repository::{DuplicateCheck, NotesRepository, SaveOutcome, TemplateProvider};
pub use storage::{
    builtin_migrations, open_database, MemoryAdapter, Migration, MigrationRunner, MigrationStatus,
    MigrationSummary, SqliteAdapter, StorageAdapter, StorageError,
};

/// Install a global tracing subscriber honoring `RUST_LOG`, defaulting to
/// `info`. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
