use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// How a stored pattern is compared against a sender address.
///
/// Priority between match types is fixed: an exact-address note always
/// outranks a broader prefix/suffix/substring note for the same sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    #[default]
    Exact,
    StartsWith,
    EndsWith,
    Contains,
}

impl MatchType {
    /// Match-type priority, lower wins. Drives the ordering of
    /// multi-match results.
    pub fn priority(self) -> u8 {
        match self {
            MatchType::Exact => 0,
            MatchType::StartsWith => 1,
            MatchType::EndsWith => 2,
            MatchType::Contains => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::StartsWith => "startsWith",
            MatchType::EndsWith => "endsWith",
            MatchType::Contains => "contains",
        }
    }

    /// Parse the wire spelling. Unknown strings are `None`, never an error.
    pub fn parse(s: &str) -> Option<MatchType> {
        match s {
            "exact" => Some(MatchType::Exact),
            "startsWith" => Some(MatchType::StartsWith),
            "endsWith" => Some(MatchType::EndsWith),
            "contains" => Some(MatchType::Contains),
            _ => None,
        }
    }

    /// Case-insensitive comparison of an email address against a pattern.
    pub fn matches(self, email: &str, pattern: &str) -> bool {
        let email = email.to_lowercase();
        let pattern = pattern.to_lowercase();
        match self {
            MatchType::Exact => email == pattern,
            MatchType::StartsWith => email.starts_with(&pattern),
            MatchType::EndsWith => email.ends_with(&pattern),
            MatchType::Contains => email.contains(&pattern),
        }
    }
}

/// A sender-matching rule with an attached free-text note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default = "generate_note_id")]
    pub id: String,
    /// Always lowercase once persisted.
    pub pattern: String,
    pub match_type: MatchType,
    #[serde(default)]
    pub note: String,
    /// The address as first typed, preserved across updates.
    #[serde(default)]
    pub original_email: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn matches(&self, email: &str) -> bool {
        self.match_type.matches(email, &self.pattern)
    }
}

/// Caller-supplied note data before the repository assigns id,
/// timestamps, and provenance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub original_email: Option<String>,
}

pub fn generate_note_id() -> String {
    Uuid::new_v4().to_string()[..16].to_string()
}
