//! Shared fixtures for watcher and registry tests.
//!
//! Everything runs against the in-memory store, wrapped so tests can count
//! how often each path was written.

use std::{
  future::Future,
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use tempfile::TempDir;

use crate::{
  db::{ChunkStore, MemoryChunkStore, Result, StoreProvider},
  domain::{
    chunk::{Chunk, ChunkFilter, ChunkMetadata, SearchHit},
    config::{Config, IndexConfig},
    project::ProjectRoot,
  },
  service::code::SyncEngine,
};

/// Debounce window used by every watcher test
pub const TEST_COOLDOWN_MS: u64 = 200;

/// Config with a short debounce and fast retries
pub fn test_config() -> Config {
  let mut config = Config::default();
  config.watcher.cooldown_ms = TEST_COOLDOWN_MS;
  config.watcher.join_timeout_secs = 2;
  config.index.read_retries = 2;
  config.index.read_retry_delay_ms = 10;
  config
}

/// Poll `check` every 50ms until it returns true or `timeout` elapses
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
  F: FnMut() -> Fut,
  Fut: Future<Output = bool>,
{
  let deadline = tokio::time::Instant::now() + timeout;
  loop {
    if check().await {
      return true;
    }
    if tokio::time::Instant::now() >= deadline {
      return false;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
  }
}

// ============================================================================
// Project directory
// ============================================================================

pub struct TestProject {
  pub dir: TempDir,
  /// Canonical root, matching what notify reports
  pub root: PathBuf,
}

impl TestProject {
  pub fn new() -> Self {
    let dir = TempDir::new().expect("create project temp dir");
    let root = dir.path().canonicalize().expect("canonical root");
    Self { dir, root }
  }

  pub fn project_root(&self) -> ProjectRoot {
    ProjectRoot::resolve(&self.root).expect("project root")
  }

  pub fn path(&self, rel: &str) -> PathBuf {
    self.root.join(rel)
  }

  pub fn write(&self, rel: &str, content: &str) -> PathBuf {
    let path = self.path(rel);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(&path, content).expect("write file");
    path
  }

  pub fn remove(&self, rel: &str) {
    std::fs::remove_file(self.path(rel)).expect("remove file");
  }
}

// ============================================================================
// Counting store
// ============================================================================

/// In-memory store that records writes per path
#[derive(Default)]
pub struct CountingStore {
  pub inner: MemoryChunkStore,
  upserts: DashMap<String, usize>,
  deletes: DashMap<String, usize>,
}

impl CountingStore {
  pub fn upserts_for(&self, rel: &str) -> usize {
    self.upserts.get(rel).map(|n| *n).unwrap_or(0)
  }

  pub fn deletes_for(&self, rel: &str) -> usize {
    self.deletes.get(rel).map(|n| *n).unwrap_or(0)
  }

  pub async fn chunks_for(&self, rel: &str) -> Vec<Chunk> {
    self
      .inner
      .snapshot()
      .await
      .into_iter()
      .filter(|c| c.metadata.path == rel)
      .collect()
  }
}

#[async_trait]
impl ChunkStore for CountingStore {
  async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
    if let Some(first) = chunks.first() {
      *self.upserts.entry(first.metadata.path.clone()).or_insert(0) += 1;
    }
    self.inner.upsert(chunks).await
  }

  async fn delete_where(&self, filter: &ChunkFilter) -> Result<()> {
    if let Some(path) = &filter.path {
      *self.deletes.entry(path.clone()).or_insert(0) += 1;
    }
    self.inner.delete_where(filter).await
  }

  async fn search(&self, query: &str, limit: usize, filter: Option<&ChunkFilter>) -> Result<Vec<SearchHit>> {
    self.inner.search(query, limit, filter).await
  }

  async fn list(&self, filter: &ChunkFilter) -> Result<Vec<ChunkMetadata>> {
    self.inner.list(filter).await
  }

  async fn exists(&self) -> Result<bool> {
    self.inner.exists().await
  }

  async fn row_count(&self) -> Result<usize> {
    self.inner.row_count().await
  }
}

/// Hands out one [`CountingStore`] per root and counts opens
#[derive(Default)]
pub struct CountingProvider {
  stores: DashMap<ProjectRoot, Arc<CountingStore>>,
  opens: AtomicUsize,
}

impl CountingProvider {
  pub fn store(&self, root: &Path) -> Arc<CountingStore> {
    let root = ProjectRoot::resolve(root).expect("project root");
    self.stores.entry(root).or_default().value().clone()
  }

  pub fn opens(&self) -> usize {
    self.opens.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl StoreProvider for CountingProvider {
  async fn open(&self, root: &ProjectRoot, _table_name: &str) -> Result<Arc<dyn ChunkStore>> {
    self.opens.fetch_add(1, Ordering::SeqCst);
    let store: Arc<CountingStore> = self.stores.entry(root.clone()).or_default().value().clone();
    Ok(store as Arc<dyn ChunkStore>)
  }
}

/// Engine over a fresh [`CountingStore`]
pub fn engine_for(project: &TestProject, index: &IndexConfig) -> (Arc<SyncEngine>, Arc<CountingStore>) {
  let store = Arc::new(CountingStore::default());
  let engine = Arc::new(SyncEngine::new(project.project_root(), store.clone(), index));
  (engine, store)
}
