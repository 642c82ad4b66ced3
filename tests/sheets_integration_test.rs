use chrono::Utc;
use uuid::Uuid;

use costtracker::models::{CostEntry, EntryStatus, SyncStatus};
use costtracker::sheets::{SheetsClient, SheetsConfig, SheetsHttpClient};

fn test_entry() -> CostEntry {
    CostEntry {
        id: Uuid::new_v4().to_string(),
        project: format!("Integration Test Project - {}", Utc::now().timestamp()),
        cost_type: "Materials".to_string(),
        description: "integration test record".to_string(),
        amount: 42.5,
        payment_mode: "UPI".to_string(),
        status: EntryStatus::Paid,
        date: "2025-11-02".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        sync_status: SyncStatus::Local,
    }
}

#[tokio::test]
#[ignore] // Needs SHEETS_ENDPOINT_URL / SHEETS_API_TOKEN. Run with: cargo test -- --ignored
async fn test_upsert_is_idempotent_on_live_backend() {
    dotenvy::dotenv().ok();

    let config = SheetsConfig::from_env().expect("Failed to load sheets config");
    let client = SheetsHttpClient::new(config).expect("Failed to create sheets client");

    let entry = test_entry();

    // Re-submitting the same id must overwrite, not duplicate.
    client.upsert_record(&entry).await.expect("First upsert failed");
    client.upsert_record(&entry).await.expect("Second upsert failed");

    let records = client.fetch_records().await.expect("Failed to fetch records");
    let matching: Vec<_> = records.iter().filter(|r| r.id == entry.id).collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].amount, 42.5);

    client
        .delete_record(&entry.id)
        .await
        .expect("Cleanup delete failed");
}

#[tokio::test]
#[ignore] // Needs SHEETS_ENDPOINT_URL / SHEETS_API_TOKEN. Run with: cargo test -- --ignored
async fn test_ping_round_trip() {
    dotenvy::dotenv().ok();

    let config = SheetsConfig::from_env().expect("Failed to load sheets config");
    let client = SheetsHttpClient::new(config).expect("Failed to create sheets client");

    client.ping().await.expect("Ping failed");
}
