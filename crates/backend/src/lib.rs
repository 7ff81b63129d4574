//! Keeps an embedding index of source projects in step with their files.
//!
//! [`ProjectRegistry`] is the entry point: it activates a project root (full
//! sync plus a live watcher), shares it between callers and evicts it once idle.

pub mod actor;
pub mod context;
pub mod db;
pub mod embedding;
pub mod service;

mod domain;
pub use domain::{chunk, config, project};

pub use actor::{ProjectInfo, ProjectRegistry, RegistryError};
pub use db::{LanceStoreProvider, MemoryStoreProvider};
pub use embedding::SharedEmbedding;
pub use service::code::{IndexStatus, SyncEngine, SyncError, SyncReport};
