//! ProjectRegistry - one live engine and watcher per project root
//!
//! Callers share a project's context through reference counting. Contexts are
//! torn down by the idle sweep rather than on the last release, since a project
//! is often released and reacquired in quick succession.
//!
//! # Locking
//!
//! The `DashMap` guards only the root -> slot map. Each slot has its own async
//! mutex, held for that root's whole activation (full sync plus watcher start),
//! so activating one large project never stalls another. A second caller for
//! the same root waits on the slot and then just takes a reference.
//!
//! A slot removed by eviction is left `Retired`; anyone who grabbed it before
//! removal sees that and goes back to the map for a fresh one.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Instant,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::watcher::{FileSystemWatcher, WatcherError};
use crate::{
  context::files::IgnoreRuleSet,
  db::{DbError, StoreProvider},
  domain::{config::Config, project::ProjectRoot},
  service::code::{SyncEngine, SyncError},
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
  #[error("Project root does not exist or is not a directory: {0}")]
  RootNotFound(PathBuf),

  #[error("Failed to start watcher: {0}")]
  Watcher(#[from] WatcherError),

  #[error("Failed to open store: {0}")]
  Store(#[from] DbError),

  #[error("Initial sync failed: {0}")]
  Sync(#[from] SyncError),
}

// ============================================================================
// Slot state
// ============================================================================

struct ActiveProject {
  engine: Arc<SyncEngine>,
  watcher: FileSystemWatcher,
  ref_count: usize,
  last_used: Instant,
  last_used_at: DateTime<Utc>,
}

impl ActiveProject {
  fn touch(&mut self) {
    self.last_used = Instant::now();
    self.last_used_at = Utc::now();
  }
}

enum SlotState {
  /// Nobody has activated this root yet
  Vacant,
  Active(ActiveProject),
  /// Evicted or failed to activate, and removed from the map
  Retired,
}

struct ProjectSlot {
  state: Mutex<SlotState>,
}

impl ProjectSlot {
  fn vacant() -> Arc<Self> {
    Arc::new(Self {
      state: Mutex::new(SlotState::Vacant),
    })
  }
}

/// Snapshot of one active project
#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
  pub root: PathBuf,
  pub ref_count: usize,
  pub last_used: DateTime<Utc>,
  pub watching: bool,
}

// ============================================================================
// ProjectRegistry
// ============================================================================

pub struct ProjectRegistry {
  slots: DashMap<ProjectRoot, Arc<ProjectSlot>>,
  provider: Arc<dyn StoreProvider>,
  config: Config,
  last_sweep: Mutex<Instant>,
}

impl ProjectRegistry {
  pub fn new(provider: Arc<dyn StoreProvider>, config: Config) -> Self {
    Self {
      slots: DashMap::new(),
      provider,
      config,
      last_sweep: Mutex::new(Instant::now()),
    }
  }

  /// Take a reference on `path`, activating it first if needed.
  ///
  /// Activation writes the default ignore file if missing, opens the store,
  /// runs a full sync and starts the watcher. Any failure leaves the root inactive.
  pub async fn ensure_initialized(&self, path: &Path) -> Result<Arc<SyncEngine>, RegistryError> {
    self.maybe_sweep().await;

    let root = ProjectRoot::resolve(path).map_err(|_| RegistryError::RootNotFound(path.to_path_buf()))?;

    loop {
      let slot = self.slots.entry(root.clone()).or_insert_with(ProjectSlot::vacant).value().clone();
      let mut state = slot.state.lock().await;

      if let SlotState::Active(active) = &mut *state {
        active.ref_count += 1;
        active.touch();
        debug!(root = %root, ref_count = active.ref_count, "Project reference acquired");
        return Ok(active.engine.clone());
      }
      if matches!(*state, SlotState::Retired) {
        continue;
      }

      return match self.activate(&root).await {
        Ok(active) => {
          let engine = active.engine.clone();
          *state = SlotState::Active(active);
          Ok(engine)
        }
        Err(e) => {
          *state = SlotState::Retired;
          self.slots.remove_if(&root, |_, current| Arc::ptr_eq(current, &slot));
          warn!(root = %root, error = %e, "Project activation failed");
          Err(e)
        }
      };
    }
  }

  async fn activate(&self, root: &ProjectRoot) -> Result<ActiveProject, RegistryError> {
    info!(root = %root, "Activating project");

    match IgnoreRuleSet::ensure_default_file(root.as_path()) {
      Ok(true) => info!(path = %root.ignore_file().display(), "Created default ignore rules"),
      Ok(false) => {}
      Err(e) => warn!(root = %root, error = %e, "Could not write default ignore rules"),
    }

    let store = self.provider.open(root, &self.config.index.table_name).await?;
    let engine = Arc::new(SyncEngine::new(root.clone(), store, &self.config.index));

    let report = engine.sync_project().await?;
    debug!(root = %root, ?report, "Initial sync finished");

    let watcher = match FileSystemWatcher::start(engine.clone(), &self.config.watcher) {
      Ok(watcher) => watcher,
      Err(e) => {
        engine.close();
        return Err(e.into());
      }
    };

    info!(root = %root, files = report.scanned, "Project active");
    Ok(ActiveProject {
      engine,
      watcher,
      ref_count: 1,
      last_used: Instant::now(),
      last_used_at: Utc::now(),
    })
  }

  /// Drop a reference. Returns the remaining count, or `None` if the project is not active.
  ///
  /// Reaching zero does not tear anything down; the idle sweep does that.
  pub async fn release(&self, path: &Path) -> Option<usize> {
    let root = Self::lookup_root(path);
    let Some(slot) = self.slot(&root) else {
      warn!(root = %root, "Release for a project that is not active");
      return None;
    };

    let mut state = slot.state.lock().await;
    match &mut *state {
      SlotState::Active(active) => {
        active.ref_count = active.ref_count.saturating_sub(1);
        active.touch();
        debug!(root = %root, ref_count = active.ref_count, "Project reference released");
        Some(active.ref_count)
      }
      _ => {
        warn!(root = %root, "Release for a project that is not active");
        None
      }
    }
  }

  /// The engine of an active project, without taking a reference
  pub async fn get_existing(&self, path: &Path) -> Option<Arc<SyncEngine>> {
    let root = Self::lookup_root(path);
    let slot = self.slot(&root)?;
    let mut state = slot.state.lock().await;
    match &mut *state {
      SlotState::Active(active) => {
        active.touch();
        Some(active.engine.clone())
      }
      _ => None,
    }
  }

  /// Projects that are currently active, sorted by root.
  ///
  /// Waits on each slot, so a project mid-activation is reported once it is up.
  pub async fn active_projects(&self) -> Vec<ProjectInfo> {
    let mut projects = Vec::new();
    for (root, slot) in self.snapshot_slots() {
      let state = slot.state.lock().await;
      if let SlotState::Active(active) = &*state {
        projects.push(ProjectInfo {
          root: root.as_path().to_path_buf(),
          ref_count: active.ref_count,
          last_used: active.last_used_at,
          watching: active.watcher.is_running(),
        });
      }
    }
    projects.sort_by(|a, b| a.root.cmp(&b.root));
    projects
  }

  /// Evict every project idle for longer than the idle timeout, whatever its
  /// reference count. Returns the evicted roots.
  pub async fn sweep_idle(&self) -> Vec<ProjectRoot> {
    let idle_timeout = self.config.registry.idle_timeout();
    let now = Instant::now();
    *self.last_sweep.lock().await = now;

    let mut evicted = Vec::new();
    for (root, slot) in self.snapshot_slots() {
      // A locked slot is in use right now, so not idle
      let Ok(mut state) = slot.state.try_lock() else {
        continue;
      };

      let idle = matches!(&*state, SlotState::Active(active) if now.saturating_duration_since(active.last_used) >= idle_timeout);
      if !idle {
        continue;
      }

      if let SlotState::Active(active) = std::mem::replace(&mut *state, SlotState::Retired) {
        self.slots.remove_if(&root, |_, current| Arc::ptr_eq(current, &slot));
        drop(state);
        if active.ref_count > 0 {
          warn!(root = %root, ref_count = active.ref_count, "Evicting idle project with outstanding references");
        }
        Self::evict(&root, active).await;
        evicted.push(root);
      }
    }

    if !evicted.is_empty() {
      info!(evicted = evicted.len(), "Idle sweep finished");
    }
    evicted
  }

  /// Evict every project. Called once at process teardown.
  pub async fn shutdown(&self) {
    let slots = self.snapshot_slots();
    info!(projects = slots.len(), "Shutting down project registry");

    for (root, slot) in slots {
      let mut state = slot.state.lock().await;
      let previous = std::mem::replace(&mut *state, SlotState::Retired);
      self.slots.remove_if(&root, |_, current| Arc::ptr_eq(current, &slot));
      drop(state);

      if let SlotState::Active(active) = previous {
        Self::evict(&root, active).await;
      }
    }
  }

  async fn maybe_sweep(&self) {
    let interval = self.config.registry.sweep_interval();
    let due = match self.last_sweep.try_lock() {
      Ok(last) => last.elapsed() >= interval,
      // Another caller is sweeping
      Err(_) => false,
    };
    if due {
      self.sweep_idle().await;
    }
  }

  async fn evict(root: &ProjectRoot, active: ActiveProject) {
    info!(root = %root, ref_count = active.ref_count, "Evicting project");
    active.watcher.stop().await;
    active.engine.close();
  }

  fn slot(&self, root: &ProjectRoot) -> Option<Arc<ProjectSlot>> {
    self.slots.get(root).map(|entry| entry.value().clone())
  }

  /// Copies the map so no shard lock is held across an await
  fn snapshot_slots(&self) -> Vec<(ProjectRoot, Arc<ProjectSlot>)> {
    self
      .slots
      .iter()
      .map(|entry| (entry.key().clone(), entry.value().clone()))
      .collect()
  }

  /// Canonical root when the path still exists, lexical otherwise
  fn lookup_root(path: &Path) -> ProjectRoot {
    ProjectRoot::resolve(path).unwrap_or_else(|_| ProjectRoot::from_normalized(path))
  }
}
