//! Chunk storage: the [`ChunkStore`] boundary and its LanceDB and in-memory adapters

mod chunks;
mod connection;
mod memory;
mod schema;
mod store;

pub use connection::{DbError, LanceStoreProvider, ProjectDb, Result};
pub use memory::{MemoryChunkStore, MemoryStoreProvider};
pub use store::{ChunkStore, StoreProvider};
