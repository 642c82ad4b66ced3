use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    CostEntry, NewEntryRequest, OutboxItem, QueueOperation, SyncStatus, UpdateEntryRequest,
};

const ENTRY_COLUMNS: &str =
    "id, project, cost_type, description, amount, payment_mode, status, date, timestamp, sync_status";

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub total_entries: i64,
    pub unsynced_entries: i64,
    pub synced_entries: i64,
    pub total_amount: f64,
    pub project_count: i64,
}

/// Raw `sync_queue` row; the entry snapshot is stored as JSON text.
#[derive(FromRow)]
struct OutboxRow {
    id: String,
    entry: String,
    operation: QueueOperation,
    added_at: String,
    retries: i64,
    next_attempt_at: Option<String>,
    poisoned: bool,
}

impl OutboxRow {
    fn decode(self) -> Result<OutboxItem, AppError> {
        let entry: CostEntry = serde_json::from_str(&self.entry)?;
        Ok(OutboxItem {
            id: self.id,
            entry,
            operation: self.operation,
            added_at: self.added_at,
            retries: self.retries,
            next_attempt_at: self.next_attempt_at,
            poisoned: self.poisoned,
        })
    }
}

pub async fn insert_entry(
    db: &SqlitePool,
    req: NewEntryRequest,
) -> Result<CostEntry, AppError> {
    if req.amount < 0.0 {
        return Err(AppError::BadRequest("amount must be non-negative".to_string()));
    }

    let entry = CostEntry {
        id: Uuid::new_v4().to_string(),
        project: req.project,
        cost_type: req.cost_type,
        description: req.description,
        amount: req.amount,
        payment_mode: req.payment_mode,
        status: req.status,
        date: req.date,
        timestamp: Utc::now().to_rfc3339(),
        sync_status: SyncStatus::Local,
    };

    // Entry row and outbox item land in one transaction so a reader never
    // observes a local entry without its queued snapshot.
    let mut tx = db.begin().await.map_err(AppError::NotPersisted)?;

    sqlx::query(
        "INSERT INTO entries (id, project, cost_type, description, amount, payment_mode, status, date, timestamp, sync_status) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.project)
    .bind(&entry.cost_type)
    .bind(&entry.description)
    .bind(entry.amount)
    .bind(&entry.payment_mode)
    .bind(entry.status)
    .bind(&entry.date)
    .bind(&entry.timestamp)
    .bind(entry.sync_status)
    .execute(&mut *tx)
    .await
    .map_err(AppError::NotPersisted)?;

    push_queue_item(&mut tx, &entry, QueueOperation::Upsert).await?;

    tx.commit().await.map_err(AppError::NotPersisted)?;

    Ok(entry)
}

pub async fn update_entry(
    db: &SqlitePool,
    id: &str,
    req: UpdateEntryRequest,
) -> Result<CostEntry, AppError> {
    let mut tx = db.begin().await.map_err(AppError::NotPersisted)?;

    let mut current = fetch_entry_tx(&mut tx, id).await?.ok_or(AppError::NotFound)?;

    if let Some(project) = req.project {
        current.project = project;
    }
    if let Some(cost_type) = req.cost_type {
        current.cost_type = cost_type;
    }
    if let Some(description) = req.description {
        current.description = description;
    }
    if let Some(amount) = req.amount {
        if amount < 0.0 {
            return Err(AppError::BadRequest("amount must be non-negative".to_string()));
        }
        current.amount = amount;
    }
    if let Some(payment_mode) = req.payment_mode {
        current.payment_mode = payment_mode;
    }
    if let Some(status) = req.status {
        current.status = status;
    }
    if let Some(date) = req.date {
        current.date = date;
    }
    current.timestamp = Utc::now().to_rfc3339();
    current.sync_status = SyncStatus::Local;

    sqlx::query(
        "UPDATE entries \
         SET project = ?, cost_type = ?, description = ?, amount = ?, payment_mode = ?, \
             status = ?, date = ?, timestamp = ?, sync_status = ? \
         WHERE id = ?",
    )
    .bind(&current.project)
    .bind(&current.cost_type)
    .bind(&current.description)
    .bind(current.amount)
    .bind(&current.payment_mode)
    .bind(current.status)
    .bind(&current.date)
    .bind(&current.timestamp)
    .bind(current.sync_status)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(AppError::NotPersisted)?;

    push_queue_item(&mut tx, &current, QueueOperation::Upsert).await?;

    tx.commit().await.map_err(AppError::NotPersisted)?;

    Ok(current)
}

/// Removes the entry and replaces its outbox slot with a delete tombstone, so
/// the next sync run propagates the removal instead of resurrecting the entry.
pub async fn delete_entry(db: &SqlitePool, id: &str) -> Result<CostEntry, AppError> {
    let mut tx = db.begin().await.map_err(AppError::NotPersisted)?;

    let existing = fetch_entry_tx(&mut tx, id).await?.ok_or(AppError::NotFound)?;

    sqlx::query("DELETE FROM entries WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::NotPersisted)?;

    push_queue_item(&mut tx, &existing, QueueOperation::Delete).await?;

    tx.commit().await.map_err(AppError::NotPersisted)?;

    Ok(existing)
}

pub async fn fetch_entry(db: &SqlitePool, id: &str) -> Result<Option<CostEntry>, AppError> {
    let entry = sqlx::query_as::<_, CostEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;

    Ok(entry)
}

pub async fn fetch_entries(db: &SqlitePool) -> Result<Vec<CostEntry>, AppError> {
    let entries = sqlx::query_as::<_, CostEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY timestamp DESC"
    ))
    .fetch_all(db)
    .await?;

    Ok(entries)
}

pub async fn fetch_entries_by_project(
    db: &SqlitePool,
    project: &str,
) -> Result<Vec<CostEntry>, AppError> {
    let entries = sqlx::query_as::<_, CostEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries WHERE project = ? ORDER BY timestamp DESC"
    ))
    .bind(project)
    .fetch_all(db)
    .await?;

    Ok(entries)
}

pub async fn fetch_unsynced_entries(db: &SqlitePool) -> Result<Vec<CostEntry>, AppError> {
    let entries = sqlx::query_as::<_, CostEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries WHERE sync_status = 'local' ORDER BY timestamp DESC"
    ))
    .fetch_all(db)
    .await?;

    Ok(entries)
}

/// Fails with `NotFound` if the entry is gone; callers racing a delete treat
/// that as benign.
pub async fn mark_synced(db: &SqlitePool, id: &str) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE entries SET sync_status = 'synced' WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Standalone enqueue, for re-queuing an entry outside a mutation (a forced
/// re-push). Create/update/delete enqueue within their own transactions.
pub async fn enqueue_upsert(db: &SqlitePool, entry: &CostEntry) -> Result<(), AppError> {
    let mut tx = db.begin().await.map_err(AppError::NotPersisted)?;
    push_queue_item(&mut tx, entry, QueueOperation::Upsert).await?;
    tx.commit().await.map_err(AppError::NotPersisted)?;
    Ok(())
}

pub async fn fetch_queue(db: &SqlitePool) -> Result<Vec<OutboxItem>, AppError> {
    let rows = sqlx::query_as::<_, OutboxRow>(
        "SELECT id, entry, operation, added_at, retries, next_attempt_at, poisoned \
         FROM sync_queue ORDER BY added_at ASC",
    )
    .fetch_all(db)
    .await?;

    rows.into_iter().map(OutboxRow::decode).collect()
}

/// Removing an already-removed item is a no-op, matching the accepted race
/// between a finishing sync and a concurrent delete.
pub async fn dequeue(db: &SqlitePool, id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sync_queue WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;

    Ok(())
}

/// Bump the attempt counter after a failed delivery and schedule the next try.
pub async fn record_attempt(
    db: &SqlitePool,
    id: &str,
    next_attempt_at: Option<&str>,
    poisoned: bool,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE sync_queue SET retries = retries + 1, next_attempt_at = ?, poisoned = ? WHERE id = ?",
    )
    .bind(next_attempt_at)
    .bind(poisoned)
    .bind(id)
    .execute(db)
    .await?;

    Ok(())
}

/// Manual re-arm of a poisoned (or backed-off) item.
pub async fn reset_queue_item(db: &SqlitePool, id: &str) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE sync_queue SET retries = 0, next_attempt_at = NULL, poisoned = 0 WHERE id = ?",
    )
    .bind(id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Wipes entries and queue together. Administrative/test use only.
pub async fn clear_all(db: &SqlitePool) -> Result<(), AppError> {
    let mut tx = db.begin().await.map_err(AppError::NotPersisted)?;

    sqlx::query("DELETE FROM entries")
        .execute(&mut *tx)
        .await
        .map_err(AppError::NotPersisted)?;
    sqlx::query("DELETE FROM sync_queue")
        .execute(&mut *tx)
        .await
        .map_err(AppError::NotPersisted)?;

    tx.commit().await.map_err(AppError::NotPersisted)?;

    Ok(())
}

/// Full-scan aggregates; fine at this scale, nothing is maintained incrementally.
pub async fn stats(db: &SqlitePool) -> Result<StoreStats, AppError> {
    let (total_entries, total_amount, project_count): (i64, f64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(amount), 0.0), COUNT(DISTINCT project) FROM entries",
    )
    .fetch_one(db)
    .await?;

    let (unsynced_entries,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM entries WHERE sync_status = 'local'")
            .fetch_one(db)
            .await?;

    Ok(StoreStats {
        total_entries,
        unsynced_entries,
        synced_entries: total_entries - unsynced_entries,
        total_amount,
        project_count,
    })
}

async fn fetch_entry_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
) -> Result<Option<CostEntry>, AppError> {
    let entry = sqlx::query_as::<_, CostEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(entry)
}

/// Coalescing enqueue: overwrites any pending item for the same entry with the
/// fresh snapshot and resets its retry bookkeeping.
async fn push_queue_item(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &CostEntry,
    operation: QueueOperation,
) -> Result<(), AppError> {
    let snapshot = serde_json::to_string(entry)?;
    let added_at = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO sync_queue (id, entry, operation, added_at, retries, next_attempt_at, poisoned) \
         VALUES (?, ?, ?, ?, 0, NULL, 0) \
         ON CONFLICT(id) DO UPDATE SET \
             entry = excluded.entry, \
             operation = excluded.operation, \
             added_at = excluded.added_at, \
             retries = 0, \
             next_attempt_at = NULL, \
             poisoned = 0",
    )
    .bind(&entry.id)
    .bind(&snapshot)
    .bind(operation)
    .bind(&added_at)
    .execute(&mut **tx)
    .await
    .map_err(AppError::NotPersisted)?;

    Ok(())
}
