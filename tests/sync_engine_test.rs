mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, watch};

use common::{RecordingSheetsClient, new_entry_req, setup_test_db};
use costtracker::db::repository;
use costtracker::error::AppError;
use costtracker::models::{CostEntry, EntryStatus, QueueOperation, SyncStatus};
use costtracker::services::SyncEngine;
use costtracker::sheets::{RemoteRecord, SheetsClient};

fn test_engine(
    db: sqlx::SqlitePool,
    sheets: Arc<dyn SheetsClient>,
    online_rx: watch::Receiver<bool>,
) -> SyncEngine {
    // Zero pacing and immediate retry eligibility keep the tests fast.
    SyncEngine::new(db, sheets, online_rx)
        .with_pacing(Duration::ZERO)
        .with_retry_policy(0, 0, 8)
}

#[tokio::test]
async fn test_sync_all_offline_leaves_queue_untouched() {
    let pool = setup_test_db().await;
    let sheets = Arc::new(RecordingSheetsClient::default());
    let (_online_tx, online_rx) = watch::channel(false);
    let engine = test_engine(pool.clone(), sheets.clone(), online_rx);

    repository::insert_entry(&pool, new_entry_req("Site A", 100.0, EntryStatus::Paid))
        .await
        .unwrap();

    let report = engine.sync_all().await;
    assert!(!report.success);
    assert_eq!(report.message, "No internet connection");
    assert_eq!(report.synced, 0);

    assert_eq!(sheets.upsert_count(), 0);
    assert_eq!(repository::fetch_queue(&pool).await.unwrap().len(), 1);
    assert_eq!(
        repository::fetch_unsynced_entries(&pool).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_sync_all_delivers_queued_entries() {
    let pool = setup_test_db().await;
    let sheets = Arc::new(RecordingSheetsClient::default());
    let (_online_tx, online_rx) = watch::channel(true);
    let engine = test_engine(pool.clone(), sheets.clone(), online_rx);

    let a = repository::insert_entry(&pool, new_entry_req("Site A", 100.0, EntryStatus::Paid))
        .await
        .unwrap();
    let b = repository::insert_entry(&pool, new_entry_req("Site B", 50.0, EntryStatus::Pending))
        .await
        .unwrap();

    let report = engine.sync_all().await;
    assert!(report.success);
    assert_eq!(report.synced, 2);
    assert_eq!(report.failed, 0);

    assert_eq!(sheets.upsert_count(), 2);
    assert!(repository::fetch_queue(&pool).await.unwrap().is_empty());
    for id in [&a.id, &b.id] {
        let entry = repository::fetch_entry(&pool, id).await.unwrap().unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Synced);
    }

    // An empty queue is a successful no-op run.
    let report = engine.sync_all().await;
    assert!(report.success);
    assert_eq!(report.message, "Nothing to sync");
}

/// Blocks every upsert until the test hands out permits.
struct GatedSheetsClient {
    gate: Semaphore,
}

#[async_trait]
impl SheetsClient for GatedSheetsClient {
    async fn upsert_record(&self, _entry: &CostEntry) -> Result<(), AppError> {
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        Ok(())
    }

    async fn delete_record(&self, _id: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn fetch_records(&self) -> Result<Vec<RemoteRecord>, AppError> {
        Ok(Vec::new())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_sync_all_is_mutually_exclusive() {
    let pool = setup_test_db().await;
    let sheets = Arc::new(GatedSheetsClient {
        gate: Semaphore::new(0),
    });
    let (_online_tx, online_rx) = watch::channel(true);
    let engine = Arc::new(test_engine(pool.clone(), sheets.clone(), online_rx));

    repository::insert_entry(&pool, new_entry_req("Site A", 100.0, EntryStatus::Paid))
        .await
        .unwrap();

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync_all().await })
    };

    // Give the first run time to take the permit and block in delivery.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.is_syncing());

    let second = engine.sync_all().await;
    assert!(!second.success);
    assert_eq!(second.message, "Sync already in progress");

    sheets.gate.add_permits(1);
    let first = first.await.unwrap();
    assert!(first.success);
    assert_eq!(first.synced, 1);
    assert!(!engine.is_syncing());

    // The flag was released, so a fresh run goes through.
    let third = engine.sync_all().await;
    assert!(third.success);
    assert_eq!(third.message, "Nothing to sync");
}

#[tokio::test]
async fn test_failed_delivery_is_retried_next_run() {
    let pool = setup_test_db().await;
    let sheets = Arc::new(RecordingSheetsClient::failing());
    let (_online_tx, online_rx) = watch::channel(true);
    let engine = test_engine(pool.clone(), sheets.clone(), online_rx);

    let entry = repository::insert_entry(&pool, new_entry_req("Site A", 100.0, EntryStatus::Paid))
        .await
        .unwrap();

    let report = engine.sync_all().await;
    assert!(report.success);
    assert_eq!(report.synced, 0);
    assert_eq!(report.failed, 1);

    // Item stays queued with its snapshot; the entry stays local.
    let queue = repository::fetch_queue(&pool).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].retries, 1);
    assert_eq!(queue[0].entry.amount, 100.0);
    let stored = repository::fetch_entry(&pool, &entry.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Local);

    sheets.set_failing(false);
    let report = engine.sync_all().await;
    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 0);

    assert!(repository::fetch_queue(&pool).await.unwrap().is_empty());
    let stored = repository::fetch_entry(&pool, &entry.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn test_backoff_defers_item_until_due() {
    let pool = setup_test_db().await;
    let sheets = Arc::new(RecordingSheetsClient::failing());
    let (_online_tx, online_rx) = watch::channel(true);
    // Real backoff: a failed item is not eligible again within this test.
    let engine = SyncEngine::new(pool.clone(), sheets.clone(), online_rx)
        .with_pacing(Duration::ZERO)
        .with_retry_policy(3600, 3600, 8);

    repository::insert_entry(&pool, new_entry_req("Site A", 100.0, EntryStatus::Paid))
        .await
        .unwrap();

    let report = engine.sync_all().await;
    assert_eq!(report.failed, 1);

    // Delivery works again, but the item is backed off, so nothing happens.
    sheets.set_failing(false);
    let report = engine.sync_all().await;
    assert!(report.success);
    assert_eq!(report.synced, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(repository::fetch_queue(&pool).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_poisoned_item_is_skipped_until_reset() {
    let pool = setup_test_db().await;
    let sheets = Arc::new(RecordingSheetsClient::failing());
    let (_online_tx, online_rx) = watch::channel(true);
    let engine = SyncEngine::new(pool.clone(), sheets.clone(), online_rx)
        .with_pacing(Duration::ZERO)
        .with_retry_policy(0, 0, 2);

    let entry = repository::insert_entry(&pool, new_entry_req("Site A", 100.0, EntryStatus::Paid))
        .await
        .unwrap();

    engine.sync_all().await;
    engine.sync_all().await;

    let queue = repository::fetch_queue(&pool).await.unwrap();
    assert_eq!(queue[0].retries, 2);
    assert!(queue[0].poisoned);

    // Poisoned items no longer count as failures and are left alone.
    sheets.set_failing(false);
    let report = engine.sync_all().await;
    assert_eq!(report.synced, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(repository::fetch_queue(&pool).await.unwrap().len(), 1);

    repository::reset_queue_item(&pool, &entry.id).await.unwrap();
    let report = engine.sync_all().await;
    assert_eq!(report.synced, 1);
    assert!(repository::fetch_queue(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_tombstone_propagates_to_backend() {
    let pool = setup_test_db().await;
    let sheets = Arc::new(RecordingSheetsClient::default());
    let (_online_tx, online_rx) = watch::channel(true);
    let engine = test_engine(pool.clone(), sheets.clone(), online_rx);

    let entry = repository::insert_entry(&pool, new_entry_req("Site A", 100.0, EntryStatus::Paid))
        .await
        .unwrap();
    engine.sync_all().await;
    assert_eq!(sheets.upsert_count(), 1);

    repository::delete_entry(&pool, &entry.id).await.unwrap();
    let queue = repository::fetch_queue(&pool).await.unwrap();
    assert_eq!(queue[0].operation, QueueOperation::Delete);

    let report = engine.sync_all().await;
    assert_eq!(report.synced, 1);
    assert_eq!(sheets.delete_count(), 1);
    assert_eq!(sheets.deletes.lock().unwrap()[0], entry.id);
    assert!(repository::fetch_queue(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unsynced_update_coalesces_before_delivery() {
    let pool = setup_test_db().await;
    let sheets = Arc::new(RecordingSheetsClient::default());
    let (_online_tx, online_rx) = watch::channel(true);
    let engine = test_engine(pool.clone(), sheets.clone(), online_rx);

    let entry = repository::insert_entry(&pool, new_entry_req("Site A", 100.0, EntryStatus::Paid))
        .await
        .unwrap();
    repository::update_entry(
        &pool,
        &entry.id,
        costtracker::models::UpdateEntryRequest {
            amount: Some(200.0),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let report = engine.sync_all().await;
    assert_eq!(report.synced, 1);

    // Exactly one delivery, carrying the coalesced state.
    let upserts = sheets.upserts.lock().unwrap();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].amount, 200.0);
}

#[tokio::test]
async fn test_upsert_for_entry_deleted_midflight_still_dequeues() {
    let pool = setup_test_db().await;
    let sheets = Arc::new(RecordingSheetsClient::default());
    let (_online_tx, online_rx) = watch::channel(true);
    let engine = test_engine(pool.clone(), sheets.clone(), online_rx);

    let entry = repository::insert_entry(&pool, new_entry_req("Site A", 100.0, EntryStatus::Paid))
        .await
        .unwrap();

    // Simulate the entry disappearing underneath its queued snapshot.
    sqlx::query("DELETE FROM entries WHERE id = ?")
        .bind(&entry.id)
        .execute(&pool)
        .await
        .unwrap();

    let report = engine.sync_all().await;
    assert!(report.success);
    assert_eq!(report.synced, 1);
    assert!(repository::fetch_queue(&pool).await.unwrap().is_empty());
}
