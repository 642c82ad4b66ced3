pub mod entry;
pub mod outbox;

pub use entry::{CostEntry, EntryStatus, NewEntryRequest, SyncStatus, UpdateEntryRequest};
pub use outbox::{OutboxItem, QueueOperation};
