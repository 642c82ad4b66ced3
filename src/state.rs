use std::sync::Arc;

use sqlx::SqlitePool;

use crate::services::{ConnectivityMonitor, SyncEngine};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: Arc<SyncEngine>,
    pub monitor: Arc<ConnectivityMonitor>,
}
