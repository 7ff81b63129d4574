//! SyncEngine - keeps one project's chunk collection in step with its files
//!
//! Every mutation of the collection goes through `write_lock`, because the
//! embedded store only tolerates one writer. Comparison reads (`stored_hash`,
//! `stored_hashes`) skip the lock and treat a missing collection as empty.
//!
//! A file is always replaced wholesale: all chunks for its path are deleted,
//! then the new set is inserted, so a query never sees a mix of old and new
//! chunks and a shrinking split never leaves orphans behind.

use std::{
  collections::{BTreeMap, HashMap},
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Instant,
};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::scan::scan_disk;
use crate::{
  context::files::{
    ChunkingPolicy, ContentHasher, FileRead, IgnoreRuleSet,
    chunker::wrap_segment,
  },
  db::{ChunkStore, DbError},
  domain::{
    chunk::{Chunk, ChunkFilter, SearchHit},
    config::IndexConfig,
    project::{ProjectRoot, relative_path},
  },
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("Store error: {0}")]
  Store(#[from] DbError),

  #[error("Engine for {0} is closed")]
  Closed(String),

  #[error("Path is outside the project root: {path}")]
  OutsideRoot { path: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;

// ============================================================================
// Outcomes
// ============================================================================

/// What `upsert_file` did with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
  /// Chunks for the path were replaced with `chunks` new ones
  Indexed { chunks: usize },
  /// Binary, blank or missing. Any chunks left for the path were removed.
  Removed,
  /// Could not be read. The existing chunks were left alone.
  Skipped,
}

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  /// Eligible files found on disk
  pub scanned: usize,
  /// Files in the collection before the pass
  pub stored: usize,
  pub upserted: usize,
  pub deleted: usize,
  pub unchanged: usize,
  /// Present on disk but unreadable, left as indexed
  pub unreadable: usize,
  /// Per-file failures that were logged and skipped
  pub failed: usize,
  pub duration_ms: u64,
}

impl SyncReport {
  /// Whether the pass changed the collection
  pub fn touched(&self) -> bool {
    self.upserted > 0 || self.deleted > 0
  }
}

/// Size of a project's collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
  pub files: usize,
  pub chunks: usize,
}

// ============================================================================
// SyncEngine
// ============================================================================

pub struct SyncEngine {
  root: ProjectRoot,
  store: Arc<dyn ChunkStore>,
  policy: ChunkingPolicy,
  hasher: ContentHasher,
  write_lock: Mutex<()>,
  closed: AtomicBool,
}

impl SyncEngine {
  pub fn new(root: ProjectRoot, store: Arc<dyn ChunkStore>, config: &IndexConfig) -> Self {
    Self {
      root,
      store,
      policy: ChunkingPolicy::new(config),
      hasher: ContentHasher::new(config),
      write_lock: Mutex::new(()),
      closed: AtomicBool::new(false),
    }
  }

  pub fn root(&self) -> &ProjectRoot {
    &self.root
  }

  pub fn hasher(&self) -> &ContentHasher {
    &self.hasher
  }

  /// Root-relative, forward-slash path of `path`
  pub fn relative_path(&self, path: &Path) -> Result<String> {
    relative_path(self.root.as_path(), path).ok_or_else(|| SyncError::OutsideRoot {
      path: path.display().to_string(),
    })
  }

  /// Stop accepting mutations. Workers still holding the engine get [`SyncError::Closed`].
  pub fn close(&self) {
    if !self.closed.swap(true, Ordering::SeqCst) {
      debug!(root = %self.root, "Sync engine closed");
    }
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }

  fn ensure_open(&self) -> Result<()> {
    if self.is_closed() {
      return Err(SyncError::Closed(self.root.to_string()));
    }
    Ok(())
  }

  // --------------------------------------------------------------------------
  // Single-file operations
  // --------------------------------------------------------------------------

  /// Re-index one file, replacing every chunk stored for its path.
  #[tracing::instrument(level = "trace", skip(self), fields(root = %self.root))]
  pub async fn upsert_file(&self, path: &Path) -> Result<UpsertOutcome> {
    self.ensure_open()?;
    let rel = self.relative_path(path)?;

    let content = match self.hasher.read(path).await {
      FileRead::Text(content) => content,
      FileRead::Unreadable(e) => {
        warn!(path = %rel, error = %e, "Skipping unreadable file, keeping indexed chunks");
        return Ok(UpsertOutcome::Skipped);
      }
      FileRead::Binary | FileRead::Blank | FileRead::Missing => {
        let _guard = self.write_lock.lock().await;
        self.ensure_open()?;
        self.store.delete_where(&ChunkFilter::path(&rel)).await?;
        debug!(path = %rel, "File not indexable, cleared chunks");
        return Ok(UpsertOutcome::Removed);
      }
    };

    let chunks = self.build_chunks(&rel, &content);
    let count = chunks.len();

    let _guard = self.write_lock.lock().await;
    self.ensure_open()?;
    self.replace_chunks(&rel, &chunks).await?;

    debug!(path = %rel, chunks = count, "Indexed file");
    Ok(UpsertOutcome::Indexed { chunks: count })
  }

  /// Remove every chunk for `path`. A path that was never indexed is fine.
  #[tracing::instrument(level = "trace", skip(self), fields(root = %self.root))]
  pub async fn delete_file(&self, path: &Path) -> Result<()> {
    self.ensure_open()?;
    let rel = self.relative_path(path)?;

    let _guard = self.write_lock.lock().await;
    self.ensure_open()?;
    self.store.delete_where(&ChunkFilter::path(&rel)).await?;

    debug!(path = %rel, "Deleted file chunks");
    Ok(())
  }

  /// Remove `path` and, when it was a directory, every file stored beneath it.
  ///
  /// A removed path is gone from disk, so whether it was a file or a directory
  /// is decided from the collection. Returns the number of files removed.
  #[tracing::instrument(level = "trace", skip(self), fields(root = %self.root))]
  pub async fn delete_tree(&self, path: &Path) -> Result<usize> {
    self.ensure_open()?;
    let rel = self.relative_path(path)?;

    let _guard = self.write_lock.lock().await;
    self.ensure_open()?;

    if !self.store.list(&ChunkFilter::head(&rel)).await?.is_empty() {
      self.store.delete_where(&ChunkFilter::path(&rel)).await?;
      debug!(path = %rel, "Deleted file chunks");
      return Ok(1);
    }

    let prefix = format!("{rel}/");
    let nested: Vec<String> = self
      .store
      .list(&ChunkFilter::heads())
      .await?
      .into_iter()
      .map(|m| m.path)
      .filter(|p| p.starts_with(&prefix))
      .collect();

    for file in &nested {
      self.store.delete_where(&ChunkFilter::path(file)).await?;
    }
    if !nested.is_empty() {
      debug!(path = %rel, files = nested.len(), "Deleted directory chunks");
    }
    Ok(nested.len())
  }

  /// Apply a rename under a single hold of the write lock.
  ///
  /// Either side may be `None` when that endpoint is ignored: the old path is
  /// only deleted and the new path only indexed.
  #[tracing::instrument(level = "trace", skip(self), fields(root = %self.root))]
  pub async fn move_file(&self, from: Option<&Path>, to: Option<&Path>) -> Result<Option<UpsertOutcome>> {
    self.ensure_open()?;
    let from_rel = from.map(|p| self.relative_path(p)).transpose()?;

    let prepared = match to {
      Some(path) => {
        let rel = self.relative_path(path)?;
        let read = self.hasher.read(path).await;
        Some((rel, read))
      }
      None => None,
    };

    let _guard = self.write_lock.lock().await;
    self.ensure_open()?;

    if let Some(rel) = &from_rel {
      self.store.delete_where(&ChunkFilter::path(rel)).await?;
    }

    let outcome = match prepared {
      Some((rel, FileRead::Text(content))) => {
        let chunks = self.build_chunks(&rel, &content);
        self.replace_chunks(&rel, &chunks).await?;
        Some(UpsertOutcome::Indexed { chunks: chunks.len() })
      }
      Some((rel, FileRead::Unreadable(e))) => {
        warn!(path = %rel, error = %e, "Move target unreadable, leaving it for the next sync");
        Some(UpsertOutcome::Skipped)
      }
      Some((rel, _)) => {
        self.store.delete_where(&ChunkFilter::path(&rel)).await?;
        Some(UpsertOutcome::Removed)
      }
      None => None,
    };

    debug!(from = ?from_rel, outcome = ?outcome, "Applied move");
    Ok(outcome)
  }

  fn build_chunks(&self, rel: &str, content: &str) -> Vec<Chunk> {
    let hash = ContentHasher::hash(content);
    let segments: Vec<String> = self
      .policy
      .chunk(content, rel)
      .iter()
      .map(|segment| wrap_segment(rel, segment))
      .collect();
    Chunk::from_segments(rel, &hash, segments, Utc::now())
  }

  /// Caller holds the write lock
  async fn replace_chunks(&self, rel: &str, chunks: &[Chunk]) -> Result<()> {
    self.store.delete_where(&ChunkFilter::path(rel)).await?;
    self.store.upsert(chunks).await?;
    Ok(())
  }

  // --------------------------------------------------------------------------
  // Reads
  // --------------------------------------------------------------------------

  /// Stored fingerprint per indexed path, read from chunk 0 of each file
  pub async fn stored_hashes(&self) -> Result<HashMap<String, String>> {
    let heads = self.store.list(&ChunkFilter::heads()).await?;
    Ok(heads.into_iter().map(|m| (m.path, m.hash)).collect())
  }

  /// Stored fingerprint of one path
  pub async fn stored_hash(&self, rel: &str) -> Result<Option<String>> {
    let heads = self.store.list(&ChunkFilter::head(rel)).await?;
    Ok(heads.into_iter().next().map(|m| m.hash))
  }

  pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
    Ok(self.store.search(query, limit, None).await?)
  }

  pub async fn status(&self) -> Result<IndexStatus> {
    if !self.store.exists().await? {
      return Ok(IndexStatus::default());
    }
    let files = self.store.list(&ChunkFilter::heads()).await?.len();
    let chunks = self.store.row_count().await?;
    Ok(IndexStatus { files, chunks })
  }

  // --------------------------------------------------------------------------
  // Bulk operations
  // --------------------------------------------------------------------------

  /// Drop every chunk of the project. The next sync indexes from scratch.
  pub async fn reset(&self) -> Result<()> {
    self.ensure_open()?;
    let _guard = self.write_lock.lock().await;
    self.ensure_open()?;
    self.store.delete_where(&ChunkFilter::default()).await?;
    info!(root = %self.root, "Index reset");
    Ok(())
  }

  /// Full reconciliation of disk against the collection.
  ///
  /// Deletes run before upserts. Per-file failures are logged and counted,
  /// never abort the pass. Unreadable files keep whatever is indexed for them.
  pub async fn sync_project(&self) -> Result<SyncReport> {
    self.ensure_open()?;
    let start = Instant::now();

    let rules = IgnoreRuleSet::load(self.root.as_path());
    let disk = scan_disk(self.root.as_path(), &rules, &self.hasher).await;
    let stored = self.stored_hashes().await?;

    let mut report = SyncReport {
      scanned: disk.hashes.len(),
      stored: stored.len(),
      unreadable: disk.unreadable.len(),
      ..Default::default()
    };

    let deletes: Vec<&String> = stored
      .keys()
      .filter(|rel| !disk.hashes.contains_key(*rel) && !disk.unreadable.contains(*rel))
      .collect();

    // Sorted so passes over the same tree process files in the same order
    let upserts: BTreeMap<&String, &String> = disk
      .hashes
      .iter()
      .filter(|(rel, hash)| stored.get(*rel) != Some(*hash))
      .collect();
    report.unchanged = disk.hashes.len() - upserts.len();

    debug!(
      root = %self.root,
      deletes = deletes.len(),
      upserts = upserts.len(),
      unchanged = report.unchanged,
      "Reconciliation plan"
    );

    for rel in deletes {
      match self.delete_file(&self.root.as_path().join(rel)).await {
        Ok(()) => report.deleted += 1,
        Err(e @ SyncError::Closed(_)) => return Err(e),
        Err(e) => {
          warn!(path = %rel, error = %e, "Failed to delete stale file");
          report.failed += 1;
        }
      }
    }

    for rel in upserts.keys() {
      match self.upsert_file(&self.root.as_path().join(rel)).await {
        Ok(UpsertOutcome::Indexed { .. }) => report.upserted += 1,
        Ok(UpsertOutcome::Removed) => report.deleted += 1,
        Ok(UpsertOutcome::Skipped) => report.unreadable += 1,
        Err(e @ SyncError::Closed(_)) => return Err(e),
        Err(e) => {
          warn!(path = %rel, error = %e, "Failed to index file");
          report.failed += 1;
        }
      }
    }

    if report.touched() {
      let _guard = self.write_lock.lock().await;
      if let Err(e) = self.store.rebuild_secondary_indexes().await {
        warn!(root = %self.root, error = %e, "Index rebuild failed, continuing");
      }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    info!(
      root = %self.root,
      scanned = report.scanned,
      upserted = report.upserted,
      deleted = report.deleted,
      unchanged = report.unchanged,
      failed = report.failed,
      duration_ms = report.duration_ms,
      "Project sync complete"
    );

    Ok(report)
  }
}
