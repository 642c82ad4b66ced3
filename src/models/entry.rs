use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Payment state of a recorded cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EntryStatus {
    Paid,
    Pending,
    Partial,
}

/// `Local` means the entry carries mutations not yet confirmed delivered;
/// `Synced` means the remote copy matched the local state at sync time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SyncStatus {
    Local,
    Synced,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CostEntry {
    pub id: String,
    pub project: String,
    pub cost_type: String,
    pub description: String,
    pub amount: f64,
    pub payment_mode: String,
    pub status: EntryStatus,
    /// Calendar date of the spend, `YYYY-MM-DD`.
    pub date: String,
    /// Last local mutation instant (RFC 3339), restamped on every create/update.
    pub timestamp: String,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntryRequest {
    pub project: String,
    pub cost_type: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    pub payment_mode: String,
    pub status: EntryStatus,
    pub date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEntryRequest {
    pub project: Option<String>,
    pub cost_type: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub payment_mode: Option<String>,
    pub status: Option<EntryStatus>,
    pub date: Option<String>,
}
