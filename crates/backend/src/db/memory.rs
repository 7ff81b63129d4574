//! In-process chunk store
//!
//! Keeps chunks in a `BTreeMap` keyed by id. Search is a plain term-overlap
//! match, enough for tests and for running without an embedding server.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;

use super::{
  Result,
  store::{ChunkStore, StoreProvider},
};
use crate::domain::{
  chunk::{Chunk, ChunkFilter, ChunkMetadata, SearchHit},
  project::ProjectRoot,
};

#[derive(Default)]
pub struct MemoryChunkStore {
  /// `None` until the first upsert creates the collection
  chunks: RwLock<Option<BTreeMap<String, Chunk>>>,
}

impl MemoryChunkStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every stored chunk, ordered by id
  pub async fn snapshot(&self) -> Vec<Chunk> {
    self
      .chunks
      .read()
      .await
      .as_ref()
      .map(|map| map.values().cloned().collect())
      .unwrap_or_default()
  }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
  async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
    let mut guard = self.chunks.write().await;
    let map = guard.get_or_insert_with(BTreeMap::new);
    for chunk in chunks {
      map.insert(chunk.id.clone(), chunk.clone());
    }
    Ok(())
  }

  async fn delete_where(&self, filter: &ChunkFilter) -> Result<()> {
    if let Some(map) = self.chunks.write().await.as_mut() {
      map.retain(|_, chunk| !filter.matches(&chunk.metadata));
    }
    Ok(())
  }

  async fn search(&self, query: &str, limit: usize, filter: Option<&ChunkFilter>) -> Result<Vec<SearchHit>> {
    let terms: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
    let guard = self.chunks.read().await;
    let Some(map) = guard.as_ref() else {
      return Ok(Vec::new());
    };

    let mut hits: Vec<SearchHit> = map
      .values()
      .filter(|chunk| filter.is_none_or(|f| f.matches(&chunk.metadata)))
      .filter_map(|chunk| {
        let text = chunk.text.to_lowercase();
        let score = terms.iter().filter(|t| text.contains(t.as_str())).count();
        (score > 0).then(|| SearchHit {
          text: chunk.text.clone(),
          metadata: chunk.metadata.clone(),
          score: score as f32,
        })
      })
      .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    Ok(hits)
  }

  async fn list(&self, filter: &ChunkFilter) -> Result<Vec<ChunkMetadata>> {
    Ok(
      self
        .chunks
        .read()
        .await
        .as_ref()
        .map(|map| {
          map
            .values()
            .filter(|c| filter.matches(&c.metadata))
            .map(|c| c.metadata.clone())
            .collect()
        })
        .unwrap_or_default(),
    )
  }

  async fn exists(&self) -> Result<bool> {
    Ok(self.chunks.read().await.is_some())
  }

  async fn row_count(&self) -> Result<usize> {
    Ok(self.chunks.read().await.as_ref().map(|m| m.len()).unwrap_or(0))
  }
}

/// Hands out one [`MemoryChunkStore`] per (root, table), kept for the life of the provider
#[derive(Default)]
pub struct MemoryStoreProvider {
  stores: DashMap<(PathBuf, String), Arc<MemoryChunkStore>>,
}

impl MemoryStoreProvider {
  pub fn new() -> Self {
    Self::default()
  }

  /// The store previously opened for `root`, if any
  pub fn store_for(&self, root: &ProjectRoot, table_name: &str) -> Option<Arc<MemoryChunkStore>> {
    self
      .stores
      .get(&(root.as_path().to_path_buf(), table_name.to_string()))
      .map(|s| s.value().clone())
  }
}

#[async_trait]
impl StoreProvider for MemoryStoreProvider {
  async fn open(&self, root: &ProjectRoot, table_name: &str) -> Result<Arc<dyn ChunkStore>> {
    let store = self
      .stores
      .entry((root.as_path().to_path_buf(), table_name.to_string()))
      .or_insert_with(|| Arc::new(MemoryChunkStore::new()))
      .value()
      .clone();
    Ok(store)
  }
}
