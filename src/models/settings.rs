use serde::{Deserialize, Serialize};

use super::note::MatchType;

/// Add-on behaviour settings.
///
/// Stored as a single record; missing fields fall back to the serde
/// defaults below, so older persisted records deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Show the note banner above matched messages.
    pub show_banner: bool,
    /// Banner background color (CSS hex).
    pub banner_color: String,
    /// Treat `user+tag@host` as `user@host` when matching.
    pub match_subaddresses: bool,
    /// Match type preselected in the note editor.
    pub default_match_type: MatchType,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_banner: true,
            banner_color: "#2e7d32".to_string(),
            match_subaddresses: false,
            default_match_type: MatchType::Exact,
        }
    }
}
