use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::db::repository;
use crate::error::AppError;
use crate::models::{OutboxItem, QueueOperation};
use crate::sheets::{RemoteRecord, SheetsClient};

const DEFAULT_PACING: Duration = Duration::from_millis(300);
const DEFAULT_RETRY_BASE_SECS: i64 = 30;
const DEFAULT_RETRY_CAP_SECS: i64 = 3600;
const DEFAULT_MAX_ATTEMPTS: i64 = 8;

/// Drains the outbox to the remote backend. One run at a time; the store stays
/// the single source of truth, the engine only goes through its operations.
pub struct SyncEngine {
    db: SqlitePool,
    sheets: Arc<dyn SheetsClient>,
    online_rx: watch::Receiver<bool>,
    is_syncing: AtomicBool,
    syncing_tx: watch::Sender<bool>,
    auto_sync_enabled: AtomicBool,
    pacing: Duration,
    retry_base_secs: i64,
    retry_cap_secs: i64,
    max_attempts: i64,
}

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    pub synced: usize,
    pub failed: usize,
}

impl SyncReport {
    fn aborted(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            synced: 0,
            failed: 0,
        }
    }
}

/// Scoped hold on the `is_syncing` flag; released on every exit path,
/// including error propagation, so a failed run can never wedge the engine.
struct SyncPermit<'a> {
    flag: &'a AtomicBool,
    state: &'a watch::Sender<bool>,
}

impl<'a> SyncPermit<'a> {
    fn acquire(flag: &'a AtomicBool, state: &'a watch::Sender<bool>) -> Option<Self> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        state.send_replace(true);
        Some(Self { flag, state })
    }
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        self.state.send_replace(false);
    }
}

impl SyncEngine {
    pub fn new(
        db: SqlitePool,
        sheets: Arc<dyn SheetsClient>,
        online_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            sheets,
            online_rx,
            is_syncing: AtomicBool::new(false),
            syncing_tx: watch::Sender::new(false),
            auto_sync_enabled: AtomicBool::new(true),
            pacing: DEFAULT_PACING,
            retry_base_secs: DEFAULT_RETRY_BASE_SECS,
            retry_cap_secs: DEFAULT_RETRY_CAP_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_retry_policy(
        mut self,
        base_secs: i64,
        cap_secs: i64,
        max_attempts: i64,
    ) -> Self {
        self.retry_base_secs = base_secs;
        self.retry_cap_secs = cap_secs;
        self.max_attempts = max_attempts;
        self
    }

    pub fn is_online(&self) -> bool {
        *self.online_rx.borrow()
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::SeqCst)
    }

    /// Indicator feed for the UI; flips while a run holds the permit.
    pub fn syncing_rx(&self) -> watch::Receiver<bool> {
        self.syncing_tx.subscribe()
    }

    pub fn auto_sync_enabled(&self) -> bool {
        self.auto_sync_enabled.load(Ordering::SeqCst)
    }

    /// Idempotent; there is one trigger loop, so repeated enables never stack
    /// timers the way re-arming an interval would.
    pub fn set_auto_sync(&self, enabled: bool) {
        self.auto_sync_enabled.store(enabled, Ordering::SeqCst);
        info!("auto-sync {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Pushes every queued item to the backend, sequentially, with pacing.
    /// Items enqueued after the snapshot is taken wait for the next run.
    pub async fn sync_all(&self) -> SyncReport {
        if self.is_syncing() {
            info!("sync already in progress");
            return SyncReport::aborted("Sync already in progress");
        }

        if !self.is_online() {
            info!("cannot sync - offline");
            return SyncReport::aborted("No internet connection");
        }

        // Two callers can pass the check above at the same suspension point;
        // the swap admits exactly one.
        let Some(_permit) = SyncPermit::acquire(&self.is_syncing, &self.syncing_tx) else {
            info!("sync already in progress");
            return SyncReport::aborted("Sync already in progress");
        };

        match self.drain_queue().await {
            Ok(report) => report,
            Err(e) => {
                warn!("sync run aborted: {}", e);
                SyncReport::aborted(e.to_string())
            }
        }
    }

    async fn drain_queue(&self) -> Result<SyncReport, AppError> {
        let queue = repository::fetch_queue(&self.db).await?;

        if queue.is_empty() {
            return Ok(SyncReport {
                success: true,
                message: "Nothing to sync".to_string(),
                synced: 0,
                failed: 0,
            });
        }

        info!("syncing {} queued items", queue.len());
        let now = Utc::now();
        let mut synced = 0;
        let mut failed = 0;
        let mut deferred = 0;

        for item in queue {
            if item.poisoned || !attempt_due(&item, now) {
                deferred += 1;
                continue;
            }

            match self.deliver(&item).await {
                Ok(()) => synced += 1,
                Err(e) => {
                    warn!("failed to sync {}: {}", item.id, e);
                    self.note_failure(&item).await?;
                    failed += 1;
                }
            }

            tokio::time::sleep(self.pacing).await;
        }

        if deferred > 0 {
            info!("{} items deferred (backoff or poisoned)", deferred);
        }

        let message = format!("Synced: {}, Failed: {}", synced, failed);
        info!("{}", message);

        Ok(SyncReport {
            success: true,
            message,
            synced,
            failed,
        })
    }

    async fn deliver(&self, item: &OutboxItem) -> Result<(), AppError> {
        match item.operation {
            QueueOperation::Upsert => {
                self.sheets.upsert_record(&item.entry).await?;
                match repository::mark_synced(&self.db, &item.id).await {
                    Ok(()) => {}
                    // The entry was deleted while its snapshot was in flight;
                    // the stale success must not keep the slot occupied.
                    Err(AppError::NotFound) => {
                        warn!("entry {} deleted while syncing", item.id)
                    }
                    Err(e) => return Err(e),
                }
            }
            QueueOperation::Delete => self.sheets.delete_record(&item.id).await?,
        }

        repository::dequeue(&self.db, &item.id).await
    }

    async fn note_failure(&self, item: &OutboxItem) -> Result<(), AppError> {
        let attempts = item.retries + 1;
        let poisoned = attempts >= self.max_attempts;
        if poisoned {
            warn!(
                "queue item {} poisoned after {} attempts; awaiting manual retry",
                item.id, attempts
            );
        }

        let delay_secs = self
            .retry_base_secs
            .saturating_mul(1_i64 << item.retries.clamp(0, 20))
            .min(self.retry_cap_secs);
        let next = (Utc::now() + chrono::Duration::seconds(delay_secs)).to_rfc3339();

        repository::record_attempt(&self.db, &item.id, Some(&next), poisoned).await
    }

    /// Read-only diagnostic; not part of the reconciliation protocol.
    pub async fn fetch_records(&self) -> Result<Vec<RemoteRecord>, AppError> {
        if !self.is_online() {
            return Err(AppError::Offline);
        }
        self.sheets.fetch_records().await
    }

    /// Read-only diagnostic; not part of the reconciliation protocol.
    pub async fn test_connection(&self) -> Result<(), AppError> {
        if !self.is_online() {
            return Err(AppError::Offline);
        }
        self.sheets.ping().await
    }
}

fn attempt_due(item: &OutboxItem, now: DateTime<Utc>) -> bool {
    match &item.next_attempt_at {
        None => true,
        Some(at) => match DateTime::parse_from_rfc3339(at) {
            Ok(at) => at.with_timezone(&Utc) <= now,
            // An unreadable schedule should not strand the item.
            Err(_) => true,
        },
    }
}
