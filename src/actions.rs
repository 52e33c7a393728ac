//! Action protocol
//!
//! The request/response boundary consumed by UI and content-script layers.
//! Each action is dispatched by name and maps 1:1 to a repository method.
//! Responses are plain data: expected business failures come back as
//! `{success: false, error, message}` with a fixed machine-checkable
//! `error` string, unexpected storage failures as `error: "storage"`.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{NoteDraft, Settings};
use crate::repository::{NotesRepository, SaveOutcome};
use crate::storage::StorageError;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum Request {
    SaveNote {
        note: NoteDraft,
    },
    DeleteNote {
        id: String,
    },
    GetAllNotes,
    GetNoteById {
        id: String,
    },
    FindAllMatchingNotes {
        email: String,
    },
    GetTemplates,
    AddTemplate {
        template: String,
    },
    UpdateTemplate {
        index: usize,
        template: String,
    },
    DeleteTemplate {
        index: usize,
    },
    GetSettings,
    SaveSettings {
        settings: Settings,
    },
}

fn failure(error: &str, message: &str) -> Value {
    json!({
        "success": false,
        "error": error,
        "message": message,
    })
}

/// Dispatch one action request against the repository.
pub async fn dispatch(repo: &NotesRepository, request: Value) -> Value {
    let request: Request = match serde_json::from_value(request) {
        Ok(request) => request,
        Err(e) => return failure("badRequest", &e.to_string()),
    };

    match handle(repo, request).await {
        Ok(response) => response,
        Err(e) => failure("storage", &e.to_string()),
    }
}

async fn handle(repo: &NotesRepository, request: Request) -> Result<Value, StorageError> {
    let response = match request {
        Request::SaveNote { note } => match repo.save_note(note).await? {
            SaveOutcome::Saved { note_id } => json!({
                "success": true,
                "noteId": note_id,
            }),
            SaveOutcome::Duplicate { existing_note_id } => json!({
                "success": false,
                "error": "duplicate",
                "message": "A note with this pattern and match type already exists",
                "existingNoteId": existing_note_id,
            }),
        },
        Request::DeleteNote { id } => {
            repo.delete_note(&id).await?;
            json!({"success": true})
        }
        Request::GetAllNotes => json!({
            "success": true,
            "notes": repo.get_all_notes().await?,
        }),
        Request::GetNoteById { id } => json!({
            "success": true,
            "note": repo.get_note_by_id(&id).await?,
        }),
        Request::FindAllMatchingNotes { email } => json!({
            "success": true,
            "notes": repo.find_notes_by_email(&email).await?,
        }),
        Request::GetTemplates => json!({
            "success": true,
            "templates": repo.get_templates().await?,
        }),
        Request::AddTemplate { template } => {
            repo.add_template(&template).await?;
            json!({
                "success": true,
                "templates": repo.get_templates().await?,
            })
        }
        Request::UpdateTemplate { index, template } => {
            repo.update_template(index, &template).await?;
            json!({
                "success": true,
                "templates": repo.get_templates().await?,
            })
        }
        Request::DeleteTemplate { index } => {
            repo.delete_template(index).await?;
            json!({
                "success": true,
                "templates": repo.get_templates().await?,
            })
        }
        Request::GetSettings => json!({
            "success": true,
            "settings": repo.get_settings().await?,
        }),
        Request::SaveSettings { settings } => {
            repo.save_settings(&settings).await?;
            json!({"success": true})
        }
    };
    Ok(response)
}
