use serde::{Deserialize, Serialize};

/// The Apps Script web app speaks a single-endpoint action protocol:
/// `{"action": "...", "data": {...}}` in, `{"status": "success" | "error"}` out.
#[derive(Debug, Serialize)]
pub struct ActionRequest<T: Serialize> {
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct ActionReply {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ActionReply {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayload<'a> {
    pub id: &'a str,
    pub project: &'a str,
    pub cost_type: &'a str,
    pub description: &'a str,
    pub amount: f64,
    pub payment_mode: &'a str,
    pub status: crate::models::EntryStatus,
    pub date: &'a str,
    pub timestamp: &'a str,
    pub synced_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePayload<'a> {
    pub id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RecordsReply {
    pub status: String,
    #[serde(default)]
    pub records: Vec<RemoteRecord>,
}

/// One spreadsheet row as the backend reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub id: String,
    pub project: String,
    pub cost_type: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    pub payment_mode: String,
    pub status: String,
    pub date: String,
    pub timestamp: String,
    #[serde(default)]
    pub synced_at: Option<String>,
}
