//! Storage boundary
//!
//! The engine only talks to a [`ChunkStore`]: one collection of chunks for one
//! project. Writes are serialized by the caller; reads may run concurrently and
//! must treat a collection that was never created as empty.

use std::sync::Arc;

use async_trait::async_trait;

use super::Result;
use crate::domain::{
  chunk::{Chunk, ChunkFilter, ChunkMetadata, SearchHit},
  project::ProjectRoot,
};

#[async_trait]
pub trait ChunkStore: Send + Sync {
  /// Insert chunks, overwriting any existing chunk with the same id.
  /// Creates the collection on first use.
  async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;

  /// Remove every chunk matching `filter`. A missing collection is a no-op.
  async fn delete_where(&self, filter: &ChunkFilter) -> Result<()>;

  /// Backend-ranked matches for `query`
  async fn search(&self, query: &str, limit: usize, filter: Option<&ChunkFilter>) -> Result<Vec<SearchHit>>;

  /// Metadata of every chunk matching `filter`, without text or vectors
  async fn list(&self, filter: &ChunkFilter) -> Result<Vec<ChunkMetadata>>;

  async fn exists(&self) -> Result<bool>;

  async fn row_count(&self) -> Result<usize>;

  /// Rebuild full-text and vector indexes after bulk changes
  async fn rebuild_secondary_indexes(&self) -> Result<()> {
    Ok(())
  }
}

/// Opens the chunk collection for a project root
#[async_trait]
pub trait StoreProvider: Send + Sync {
  async fn open(&self, root: &ProjectRoot, table_name: &str) -> Result<Arc<dyn ChunkStore>>;
}
