#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use costtracker::error::AppError;
use costtracker::models::{CostEntry, EntryStatus, NewEntryRequest};
use costtracker::sheets::{RemoteRecord, SheetsClient};

pub async fn setup_test_db() -> SqlitePool {
    // One connection so every handle sees the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test db");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub fn new_entry_req(project: &str, amount: f64, status: EntryStatus) -> NewEntryRequest {
    NewEntryRequest {
        project: project.to_string(),
        cost_type: "Labour".to_string(),
        description: "day wages".to_string(),
        amount,
        payment_mode: "Cash".to_string(),
        status,
        date: "2025-11-02".to_string(),
    }
}

/// Records every delivery; flips between failing and succeeding on demand.
#[derive(Default)]
pub struct RecordingSheetsClient {
    pub fail_deliveries: AtomicBool,
    pub upserts: Mutex<Vec<CostEntry>>,
    pub deletes: Mutex<Vec<String>>,
}

impl RecordingSheetsClient {
    pub fn failing() -> Self {
        let client = Self::default();
        client.fail_deliveries.store(true, Ordering::SeqCst);
        client
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_deliveries.store(failing, Ordering::SeqCst);
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.lock().unwrap().len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }
}

#[async_trait]
impl SheetsClient for RecordingSheetsClient {
    async fn upsert_record(&self, entry: &CostEntry) -> Result<(), AppError> {
        if self.fail_deliveries.load(Ordering::SeqCst) {
            return Err(AppError::Delivery("simulated outage".to_string()));
        }
        self.upserts.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<(), AppError> {
        if self.fail_deliveries.load(Ordering::SeqCst) {
            return Err(AppError::Delivery("simulated outage".to_string()));
        }
        self.deletes.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn fetch_records(&self) -> Result<Vec<RemoteRecord>, AppError> {
        Ok(Vec::new())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
