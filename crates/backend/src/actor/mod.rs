//! Live project contexts
//!
//! - [`FileSystemWatcher`]: feeds filesystem events for one root into its [`SyncEngine`]
//! - [`ProjectRegistry`]: shares one engine and watcher per root between callers,
//!   with reference counting and idle eviction
//!
//! [`SyncEngine`]: crate::service::code::SyncEngine

mod debounce;
mod registry;
mod watcher;

#[cfg(test)]
mod __tests__;

pub use debounce::Debouncer;
pub use registry::{ProjectInfo, ProjectRegistry, RegistryError};
pub use watcher::{Dispatch, EventDispatcher, FileSystemWatcher, FsEvent, FsEventKind, WatcherError, upsert_if_changed};
