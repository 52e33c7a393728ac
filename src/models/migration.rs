use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Durable proof that a migration has executed.
///
/// Ids follow the `NNN_description` convention: the zero-padded sequence
/// number makes lexicographic order match application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub id: String,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}
