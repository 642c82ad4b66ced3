pub mod monitor;
pub mod sync_service;

pub use monitor::{ConnectivityMonitor, SyncTrigger};
pub use sync_service::{SyncEngine, SyncReport};
