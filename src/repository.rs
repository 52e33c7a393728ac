//! Notes repository
//!
//! The single façade application layers talk to. Enforces business rules the
//! storage layer stays agnostic of: pattern normalization, duplicate
//! rejection before any side effect, id/timestamp assignment, provenance
//! preservation across updates, and template/settings defaults.

use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, info};

use crate::models::{generate_note_id, MatchType, Note, NoteDraft, Settings};
use crate::storage::{StorageAdapter, StorageError};

/// Provider of default templates, consulted only while the persisted
/// template list is empty. Defaults are never persisted automatically.
pub type TemplateProvider = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

/// Result of a `save_note` call. Duplicate rejection is an expected
/// business outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved { note_id: String },
    Duplicate { existing_note_id: String },
}

/// Result of a pre-submit duplicate probe.
#[derive(Debug, Clone)]
pub struct DuplicateCheck {
    pub exists: bool,
    pub note_id: Option<String>,
    pub note: Option<Note>,
}

/// Business façade over an injected storage adapter.
///
/// The adapter is constructor-bound; tests inject `MemoryAdapter`, the
/// application injects the SQLite adapter returned by `open_database`.
pub struct NotesRepository {
    adapter: Arc<dyn StorageAdapter>,
    default_templates: Option<TemplateProvider>,
}

impl NotesRepository {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            default_templates: None,
        }
    }

    /// Attach a default-template provider (see `TemplateProvider`).
    pub fn with_default_templates(
        mut self,
        provider: impl Fn() -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.default_templates = Some(Arc::new(provider));
        self
    }

    // Notes

    /// Save a note, enforcing the (pattern, matchType) uniqueness rule.
    ///
    /// The duplicate check runs before any id or timestamp is assigned, so a
    /// rejected write has zero side effects. Updates (draft carries an id)
    /// keep the existing note's `created_at` and `original_email`.
    pub async fn save_note(&self, draft: NoteDraft) -> Result<SaveOutcome, StorageError> {
        let pattern = draft.pattern.trim().to_lowercase();

        if let Some(existing) = self
            .adapter
            .find_duplicate(&pattern, draft.match_type, draft.id.as_deref())
            .await?
        {
            debug!("Rejected duplicate pattern {} ({})", pattern, draft.match_type.as_str());
            return Ok(SaveOutcome::Duplicate {
                existing_note_id: existing.id,
            });
        }

        let existing = match draft.id.as_deref() {
            Some(id) => self.adapter.get_note_by_id(id).await?,
            None => None,
        };

        let now = Utc::now();
        let original_email = existing
            .as_ref()
            .map(|n| n.original_email.clone())
            .filter(|s| !s.is_empty())
            .or_else(|| draft.original_email.clone().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| pattern.clone());

        let note = Note {
            id: draft.id.unwrap_or_else(generate_note_id),
            pattern,
            match_type: draft.match_type,
            note: draft.note,
            original_email,
            created_at: existing.as_ref().map(|n| n.created_at).unwrap_or(now),
            updated_at: now,
        };

        // The backend's unique index can still fire if a concurrent writer
        // slipped past the pre-check; surface that as the same outcome.
        let stored = match self.adapter.save_note(note).await {
            Ok(stored) => stored,
            Err(StorageError::Duplicate { existing_note_id }) => {
                return Ok(SaveOutcome::Duplicate { existing_note_id });
            }
            Err(e) => return Err(e),
        };

        info!("Saved note {} for pattern {}", stored.id, stored.pattern);
        Ok(SaveOutcome::Saved { note_id: stored.id })
    }

    pub async fn get_all_notes(
        &self,
    ) -> Result<std::collections::HashMap<String, Note>, StorageError> {
        self.adapter.get_all_notes().await
    }

    pub async fn get_note_by_id(&self, id: &str) -> Result<Option<Note>, StorageError> {
        self.adapter.get_note_by_id(id).await
    }

    pub async fn delete_note(&self, id: &str) -> Result<(), StorageError> {
        self.adapter.delete_note(id).await?;
        info!("Deleted note {}", id);
        Ok(())
    }

    /// Delete the single highest-priority note matching `email`.
    ///
    /// Returns the deleted note's id; no match is a no-op success.
    pub async fn delete_note_by_email(&self, email: &str) -> Result<Option<String>, StorageError> {
        match self.find_note_by_email(email).await? {
            Some(note) => {
                self.delete_note(&note.id).await?;
                Ok(Some(note.id))
            }
            None => Ok(None),
        }
    }

    /// All notes matching `email`, ordered exact > startsWith > endsWith >
    /// contains (insertion order within a tier).
    pub async fn find_notes_by_email(&self, email: &str) -> Result<Vec<Note>, StorageError> {
        self.adapter.find_notes_by_email(email).await
    }

    /// The highest-priority match only.
    pub async fn find_note_by_email(&self, email: &str) -> Result<Option<Note>, StorageError> {
        Ok(self.find_notes_by_email(email).await?.into_iter().next())
    }

    /// Pre-submit duplicate probe for UI validation. Read-only.
    pub async fn check_duplicate(
        &self,
        pattern: &str,
        match_type: MatchType,
        exclude_id: Option<&str>,
    ) -> Result<DuplicateCheck, StorageError> {
        let pattern = pattern.trim().to_lowercase();
        let found = self
            .adapter
            .find_duplicate(&pattern, match_type, exclude_id)
            .await?;
        Ok(DuplicateCheck {
            exists: found.is_some(),
            note_id: found.as_ref().map(|n| n.id.clone()),
            note: found,
        })
    }

    /// Pure predicate: does `pattern` match `email` under the given
    /// match-type string? Case-insensitive; an unknown match type is a
    /// non-match, never an error.
    pub fn validate_pattern(email: &str, pattern: &str, match_type: &str) -> bool {
        match MatchType::parse(match_type) {
            Some(mt) => mt.matches(email, pattern),
            None => false,
        }
    }

    // Templates

    /// The effective template list: the persisted list, or the provider's
    /// defaults while the persisted list is empty. Defaults are never
    /// written back automatically.
    pub async fn get_templates(&self) -> Result<Vec<String>, StorageError> {
        let stored = self.adapter.get_templates().await?;
        if stored.is_empty() {
            if let Some(provider) = &self.default_templates {
                return Ok(provider());
            }
        }
        Ok(stored)
    }

    /// Append a template. No-op when the exact string already exists in the
    /// effective list. Returns whether anything was added.
    pub async fn add_template(&self, template: &str) -> Result<bool, StorageError> {
        let mut templates = self.get_templates().await?;
        if templates.iter().any(|t| t == template) {
            return Ok(false);
        }
        templates.push(template.to_string());
        self.adapter.save_templates(templates).await?;
        Ok(true)
    }

    /// Replace the template at `index`. Out-of-range indices no-op silently;
    /// callers needing failure signaling must pre-validate.
    pub async fn update_template(&self, index: usize, template: &str) -> Result<(), StorageError> {
        let mut templates = self.get_templates().await?;
        if index >= templates.len() {
            return Ok(());
        }
        templates[index] = template.to_string();
        self.adapter.save_templates(templates).await
    }

    /// Remove the template at `index`. Out-of-range indices no-op silently.
    pub async fn delete_template(&self, index: usize) -> Result<(), StorageError> {
        let mut templates = self.get_templates().await?;
        if index >= templates.len() {
            return Ok(());
        }
        templates.remove(index);
        self.adapter.save_templates(templates).await
    }

    /// Whole-list replace.
    pub async fn save_templates(&self, templates: Vec<String>) -> Result<(), StorageError> {
        self.adapter.save_templates(templates).await
    }

    // Settings

    /// The persisted settings with defaults resolved for any missing field;
    /// a missing record yields `Settings::default()`.
    pub async fn get_settings(&self) -> Result<Settings, StorageError> {
        match self.adapter.get_settings().await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Settings::default()),
        }
    }

    /// Whole-record replace.
    pub async fn save_settings(&self, settings: &Settings) -> Result<(), StorageError> {
        let value = serde_json::to_value(settings)?;
        self.adapter.save_settings(value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryAdapter;

    fn repo() -> NotesRepository {
        NotesRepository::new(Arc::new(MemoryAdapter::new()))
    }

    fn draft(pattern: &str, match_type: MatchType, note: &str) -> NoteDraft {
        NoteDraft {
            id: None,
            pattern: pattern.to_string(),
            match_type,
            note: note.to_string(),
            original_email: None,
        }
    }

    async fn save_ok(repo: &NotesRepository, d: NoteDraft) -> String {
        match repo.save_note(d).await.unwrap() {
            SaveOutcome::Saved { note_id } => note_id,
            SaveOutcome::Duplicate { existing_note_id } => {
                panic!("unexpected duplicate of {}", existing_note_id)
            }
        }
    }

    #[tokio::test]
    async fn test_save_normalizes_pattern_and_keeps_original_email() {
        let repo = repo();
        let id = save_ok(&repo, draft("Alice@Example.com", MatchType::Exact, "VIP")).await;

        let note = repo.get_note_by_id(&id).await.unwrap().unwrap();
        assert_eq!(note.pattern, "alice@example.com");
        // No caller-supplied originalEmail: falls back to the (normalized)
        // pattern.
        assert_eq!(note.original_email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_caller_supplied_original_email_wins_for_new_notes() {
        let repo = repo();
        let mut d = draft("alice@example.com", MatchType::Exact, "VIP");
        d.original_email = Some("Alice@Example.com".to_string());
        let id = save_ok(&repo, d).await;

        let note = repo.get_note_by_id(&id).await.unwrap().unwrap();
        assert_eq!(note.original_email, "Alice@Example.com");
    }

    #[tokio::test]
    async fn test_duplicate_save_is_rejected_without_side_effects() {
        let repo = repo();
        let first_id = save_ok(&repo, draft("alice@example.com", MatchType::Exact, "VIP")).await;

        let outcome = repo
            .save_note(draft("ALICE@example.com", MatchType::Exact, "other"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::Duplicate {
                existing_note_id: first_id.clone()
            }
        );

        let notes = repo.get_all_notes().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[&first_id].note, "VIP");
    }

    #[tokio::test]
    async fn test_update_preserves_created_at_and_original_email() {
        let repo = repo();
        let mut d = draft("alice@example.com", MatchType::Exact, "VIP");
        d.original_email = Some("Alice@Example.com".to_string());
        let id = save_ok(&repo, d).await;
        let first = repo.get_note_by_id(&id).await.unwrap().unwrap();

        let update = NoteDraft {
            id: Some(id.clone()),
            pattern: "alice@example.com".to_string(),
            match_type: MatchType::Exact,
            note: "still a VIP".to_string(),
            original_email: None,
        };
        let outcome = repo.save_note(update).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Saved { note_id: id.clone() });

        let updated = repo.get_note_by_id(&id).await.unwrap().unwrap();
        assert_eq!(updated.note, "still a VIP");
        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(updated.original_email, "Alice@Example.com");
        assert!(updated.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_update_with_own_id_is_not_a_duplicate() {
        let repo = repo();
        let id = save_ok(&repo, draft("alice@example.com", MatchType::Exact, "VIP")).await;

        let update = NoteDraft {
            id: Some(id.clone()),
            pattern: "alice@example.com".to_string(),
            match_type: MatchType::Exact,
            note: "edited".to_string(),
            original_email: None,
        };
        assert_eq!(
            repo.save_note(update).await.unwrap(),
            SaveOutcome::Saved { note_id: id }
        );
    }

    #[tokio::test]
    async fn test_find_note_by_email_scenario() {
        let repo = repo();
        save_ok(&repo, draft("Alice@Example.com", MatchType::Exact, "VIP")).await;

        let hit = repo.find_note_by_email("alice@example.com").await.unwrap();
        assert_eq!(hit.unwrap().note, "VIP");

        let miss = repo.find_note_by_email("bob@example.com").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_match_priority_ordering() {
        let repo = repo();
        save_ok(&repo, draft("example.com", MatchType::Contains, "domain")).await;
        save_ok(&repo, draft("@example.com", MatchType::EndsWith, "family")).await;
        save_ok(&repo, draft("alice@example.com", MatchType::Exact, "person")).await;

        let matches = repo.find_notes_by_email("alice@example.com").await.unwrap();
        let bodies: Vec<&str> = matches.iter().map(|n| n.note.as_str()).collect();
        assert_eq!(bodies, vec!["person", "family", "domain"]);
    }

    #[tokio::test]
    async fn test_delete_note_by_email_removes_highest_priority_match() {
        let repo = repo();
        save_ok(&repo, draft("@example.com", MatchType::EndsWith, "family")).await;
        let exact_id = save_ok(&repo, draft("alice@example.com", MatchType::Exact, "person")).await;

        let deleted = repo.delete_note_by_email("alice@example.com").await.unwrap();
        assert_eq!(deleted, Some(exact_id));

        // The broader note survives; deleting for an unmatched address is a
        // no-op success.
        assert_eq!(repo.get_all_notes().await.unwrap().len(), 1);
        assert_eq!(repo.delete_note_by_email("nobody@else.net").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_check_duplicate() {
        let repo = repo();
        let id = save_ok(&repo, draft("alice@example.com", MatchType::Exact, "VIP")).await;

        let check = repo
            .check_duplicate("Alice@Example.com", MatchType::Exact, None)
            .await
            .unwrap();
        assert!(check.exists);
        assert_eq!(check.note_id.as_deref(), Some(id.as_str()));

        let editing_self = repo
            .check_duplicate("alice@example.com", MatchType::Exact, Some(&id))
            .await
            .unwrap();
        assert!(!editing_self.exists);
        assert!(editing_self.note.is_none());
    }

    #[test]
    fn test_validate_pattern() {
        assert!(NotesRepository::validate_pattern(
            "Foo@Bar.com",
            "foo@bar.com",
            "exact"
        ));
        assert!(NotesRepository::validate_pattern(
            "alice@example.com",
            "@example.com",
            "endsWith"
        ));
        assert!(!NotesRepository::validate_pattern(
            "alice@example.com",
            "bob@",
            "startsWith"
        ));
        // Unknown match types never match and never panic.
        assert!(!NotesRepository::validate_pattern(
            "foo@bar.com",
            "foo@bar.com",
            "regex"
        ));
    }

    #[tokio::test]
    async fn test_template_defaults_are_served_but_never_persisted() {
        let adapter = Arc::new(MemoryAdapter::new());
        let repo = NotesRepository::new(adapter.clone())
            .with_default_templates(|| vec!["Thanks!".to_string(), "Noted.".to_string()]);

        assert_eq!(repo.get_templates().await.unwrap(), vec!["Thanks!", "Noted."]);
        // Nothing was written through to storage.
        assert!(adapter.get_templates().await.unwrap().is_empty());

        // Adding an existing default is a no-op; the effective list is
        // unchanged and storage stays empty.
        assert!(!repo.add_template("Thanks!").await.unwrap());
        assert_eq!(repo.get_templates().await.unwrap(), vec!["Thanks!", "Noted."]);
        assert!(adapter.get_templates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_template_persists_effective_list() {
        let repo = NotesRepository::new(Arc::new(MemoryAdapter::new()))
            .with_default_templates(|| vec!["Thanks!".to_string()]);

        assert!(repo.add_template("Follow up").await.unwrap());
        assert_eq!(
            repo.get_templates().await.unwrap(),
            vec!["Thanks!", "Follow up"]
        );
    }

    #[tokio::test]
    async fn test_template_index_operations_noop_out_of_range() {
        let repo = repo();
        repo.save_templates(vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        repo.update_template(5, "x").await.unwrap();
        repo.delete_template(5).await.unwrap();
        assert_eq!(repo.get_templates().await.unwrap(), vec!["a", "b"]);

        repo.update_template(1, "c").await.unwrap();
        assert_eq!(repo.get_templates().await.unwrap(), vec!["a", "c"]);
        repo.delete_template(0).await.unwrap();
        assert_eq!(repo.get_templates().await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_settings_defaults_and_roundtrip() {
        let repo = repo();
        let settings = repo.get_settings().await.unwrap();
        assert_eq!(settings, Settings::default());

        let mut changed = settings;
        changed.show_banner = false;
        changed.default_match_type = MatchType::Contains;
        repo.save_settings(&changed).await.unwrap();

        assert_eq!(repo.get_settings().await.unwrap(), changed);
    }
}
