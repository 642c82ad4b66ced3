use serde::{Deserialize, Serialize};

use crate::models::CostEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum QueueOperation {
    Upsert,
    Delete,
}

/// A durable delivery intent. Keyed by the owning entry's id, so a new
/// mutation overwrites the pending item instead of appending a second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxItem {
    pub id: String,
    /// Full snapshot of the entry at enqueue time, not a diff. For a delete
    /// tombstone this is the last state the entry had before removal.
    pub entry: CostEntry,
    pub operation: QueueOperation,
    pub added_at: String,
    pub retries: i64,
    /// Earliest instant (RFC 3339) the item is eligible for another attempt.
    /// `None` means immediately eligible.
    pub next_attempt_at: Option<String>,
    /// Set once the item exhausts its attempts; skipped until manually re-armed.
    pub poisoned: bool,
}
