//! Code index synchronization: the [`SyncEngine`] and the disk scan behind `sync_project`

mod engine;
mod scan;

pub use engine::{IndexStatus, SyncEngine, SyncError, SyncReport, UpsertOutcome};
pub use scan::{DiskScan, scan_disk};
