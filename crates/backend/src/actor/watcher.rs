//! FileSystemWatcher - turns OS notifications into single-file sync work
//!
//! # Design
//!
//! notify runs its own thread and calls us synchronously, so:
//! 1. The notify callback uses `blocking_send` to forward raw events to a channel
//! 2. An async task drains the channel and converts raw events into [`FsEvent`]s
//! 3. [`EventDispatcher`] filters and debounces them into [`Dispatch`] decisions
//! 4. Each decision runs on its own spawned worker, capped per project by a semaphore
//!
//! Workers compare the on-disk fingerprint with the stored one before touching
//! the engine, so a save that does not change content costs one hash and one
//! lookup. All writes still funnel through the engine's write lock.
//!
//! # Lifecycle
//!
//! The event loop runs until its `CancellationToken` fires or the channel
//! closes. Stopping the watcher does not abort workers already dispatched;
//! they finish against the engine, which rejects them once it is closed.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::{Duration, Instant},
};

use notify::{
  Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
  event::{ModifyKind, RenameMode},
};
use tokio::{
  sync::{Mutex, Semaphore, mpsc},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::debounce::Debouncer;
use crate::{
  context::files::{Fingerprint, IgnoreRuleSet},
  domain::{config::WatcherSettings, project::relative_path},
  service::code::{SyncEngine, SyncError, UpsertOutcome},
};

/// Raw notify events buffered between the notify thread and the event loop
const EVENT_BUFFER: usize = 256;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
  #[error("Failed to initialize watcher: {0}")]
  Init(#[source] notify::Error),

  #[error("Failed to watch path: {0}")]
  Watch(#[source] notify::Error),
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEventKind {
  Created,
  Modified,
  Deleted,
  Moved { dest: PathBuf },
}

/// A filesystem change, consumed once by the dispatcher
#[derive(Debug, Clone)]
pub struct FsEvent {
  pub kind: FsEventKind,
  pub path: PathBuf,
  pub timestamp: Instant,
}

impl FsEvent {
  pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
    Self {
      kind,
      path: path.into(),
      timestamp: Instant::now(),
    }
  }

  /// Convert one notify event into zero or more [`FsEvent`]s
  pub fn from_notify(event: Event, timestamp: Instant) -> Vec<FsEvent> {
    let make = |kind: FsEventKind, path: &PathBuf| FsEvent {
      kind,
      path: path.clone(),
      timestamp,
    };

    match event.kind {
      EventKind::Create(_) => event.paths.iter().map(|p| make(FsEventKind::Created, p)).collect(),
      EventKind::Remove(_) => event.paths.iter().map(|p| make(FsEventKind::Deleted, p)).collect(),
      EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
        vec![make(
          FsEventKind::Moved {
            dest: event.paths[1].clone(),
          },
          &event.paths[0],
        )]
      }
      EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
        event.paths.iter().map(|p| make(FsEventKind::Deleted, p)).collect()
      }
      EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
        event.paths.iter().map(|p| make(FsEventKind::Created, p)).collect()
      }
      // Backends that report each half of a rename separately without saying which
      EventKind::Modify(ModifyKind::Name(_)) => event
        .paths
        .iter()
        .map(|p| {
          let kind = if p.exists() {
            FsEventKind::Created
          } else {
            FsEventKind::Deleted
          };
          make(kind, p)
        })
        .collect(),
      EventKind::Modify(_) => event.paths.iter().map(|p| make(FsEventKind::Modified, p)).collect(),
      EventKind::Access(_) | EventKind::Any | EventKind::Other => {
        trace!(kind = ?event.kind, "Ignoring event");
        Vec::new()
      }
    }
  }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Work decided for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
  /// The ignore-rule file changed
  ReloadRules,
  /// A directory was created or renamed. Its files are only reachable through a full pass.
  Resync,
  Upsert(PathBuf),
  Delete(PathBuf),
  /// Either side is `None` when that endpoint is ignored
  Move {
    from: Option<PathBuf>,
    to: Option<PathBuf>,
  },
}

/// Filters and debounces events. Owns the current rule set.
pub struct EventDispatcher {
  root: PathBuf,
  rules: IgnoreRuleSet,
  debouncer: Debouncer,
}

impl EventDispatcher {
  pub fn new(root: PathBuf, rules: IgnoreRuleSet, cooldown: Duration) -> Self {
    Self {
      root,
      rules,
      debouncer: Debouncer::new(cooldown),
    }
  }

  pub fn rules(&self) -> &IgnoreRuleSet {
    &self.rules
  }

  /// Reread the rule file from disk
  pub fn reload_rules(&mut self) {
    self.rules = IgnoreRuleSet::load(&self.root);
    info!(
      root = %self.root.display(),
      dirs = self.rules.ignored_dirs().len(),
      exts = self.rules.ignored_extensions().len(),
      patterns = self.rules.raw_patterns().len(),
      "Reloaded ignore rules"
    );
  }

  /// Decide what, if anything, to do about `event`
  pub fn route(&mut self, event: &FsEvent) -> Option<Dispatch> {
    if self.is_rules_event(event) {
      // Reload on every event so the last write of a burst wins. Only the resync is debounced.
      self.reload_rules();
      return self
        .debouncer
        .should_dispatch(&event.path, event.timestamp)
        .then_some(Dispatch::ReloadRules);
    }

    match &event.kind {
      FsEventKind::Created if event.path.is_dir() => {
        if self.is_ignored_dir(&event.path) {
          trace!(path = %event.path.display(), "Filtered directory");
          return None;
        }
        // Files land before the recursive watch reaches the new directory. One
        // pass per window, so a `cp -r` or checkout costs one resync.
        debug!(path = %event.path.display(), "Directory created");
        self
          .debouncer
          .should_dispatch(&self.root, event.timestamp)
          .then_some(Dispatch::Resync)
      }
      FsEventKind::Created | FsEventKind::Modified => {
        if event.path.is_dir() || self.is_ignored(&event.path) {
          trace!(path = %event.path.display(), "Filtered event");
          return None;
        }
        self
          .debouncer
          .should_dispatch(&event.path, event.timestamp)
          .then(|| Dispatch::Upsert(event.path.clone()))
      }
      // Deletes are never debounced, a dropped delete would leave stale chunks.
      // The path may have been a directory, which the worker settles from the index.
      FsEventKind::Deleted => {
        if self.is_ignored(&event.path) {
          trace!(path = %event.path.display(), "Filtered event");
          return None;
        }
        self.debouncer.forget(&event.path);
        Some(Dispatch::Delete(event.path.clone()))
      }
      FsEventKind::Moved { dest } if dest.is_dir() => {
        if self.is_ignored(&event.path) && self.is_ignored(dest) {
          return None;
        }
        debug!(from = %event.path.display(), to = %dest.display(), "Directory moved");
        Some(Dispatch::Resync)
      }
      FsEventKind::Moved { dest } => {
        let from = (!self.is_ignored(&event.path)).then(|| event.path.clone());
        let to = (!self.is_ignored(dest)).then(|| dest.clone());

        if let Some(from) = &from {
          self.debouncer.forget(from);
        }
        if let Some(to) = &to {
          // Absorb the trailing modify many editors send after renaming into place
          self.debouncer.forget(to);
          self.debouncer.should_dispatch(to, event.timestamp);
        }

        if from.is_none() && to.is_none() {
          trace!(from = %event.path.display(), to = %dest.display(), "Filtered move");
          return None;
        }
        Some(Dispatch::Move { from, to })
      }
    }
  }

  fn is_rules_event(&self, event: &FsEvent) -> bool {
    IgnoreRuleSet::is_rules_file(&self.root, &event.path)
      || matches!(&event.kind, FsEventKind::Moved { dest } if IgnoreRuleSet::is_rules_file(&self.root, dest))
      || (event.kind == FsEventKind::Created && self.is_rules_dir(&event.path))
  }

  /// The state directory, created along with a rules file the watch has not seen yet
  fn is_rules_dir(&self, path: &Path) -> bool {
    let rules = IgnoreRuleSet::rules_path(&self.root);
    rules.parent() == Some(path) && rules.is_file()
  }

  /// Paths outside the root, and the root itself, count as ignored
  fn is_ignored(&self, path: &Path) -> bool {
    match relative_path(&self.root, path) {
      Some(rel) => self.rules.is_ignored(&rel),
      None => true,
    }
  }

  fn is_ignored_dir(&self, path: &Path) -> bool {
    match relative_path(&self.root, path) {
      Some(rel) => self.rules.is_ignored_dir(&rel),
      None => true,
    }
  }
}

// ============================================================================
// FileSystemWatcher
// ============================================================================

/// Live watcher for one project root
pub struct FileSystemWatcher {
  root: PathBuf,
  cancel: CancellationToken,
  task: Mutex<Option<JoinHandle<()>>>,
  join_timeout: Duration,
}

impl FileSystemWatcher {
  /// Subscribe to notifications under the engine's root and start the event loop.
  ///
  /// Fails if the OS watch cannot be established. Must be called inside a tokio runtime.
  pub fn start(engine: Arc<SyncEngine>, settings: &WatcherSettings) -> Result<Self, WatcherError> {
    let root = engine.root().as_path().to_path_buf();
    info!(root = %root.display(), "Starting file watcher");

    let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>(EVENT_BUFFER);
    let notify_config = NotifyConfig::default().with_poll_interval(settings.poll_interval());

    let mut watcher = RecommendedWatcher::new(
      move |res| {
        // Runs on the notify thread. A closed channel means we are shutting down.
        let _ = event_tx.blocking_send(res);
      },
      notify_config,
    )
    .map_err(WatcherError::Init)?;

    watcher
      .watch(&root, RecursiveMode::Recursive)
      .map_err(WatcherError::Watch)?;

    let cancel = CancellationToken::new();
    let event_loop = EventLoop {
      dispatcher: EventDispatcher::new(root.clone(), IgnoreRuleSet::load(&root), settings.cooldown()),
      engine,
      permits: Arc::new(Semaphore::new(settings.max_inflight.max(1))),
      settle: settings.cooldown(),
      cancel: cancel.clone(),
      event_rx,
      _watcher: watcher,
    };
    let task = tokio::spawn(event_loop.run());

    Ok(Self {
      root,
      cancel,
      task: Mutex::new(Some(task)),
      join_timeout: settings.join_timeout(),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn is_running(&self) -> bool {
    !self.cancel.is_cancelled()
  }

  /// Stop accepting events and wait a bounded time for the event loop to exit.
  ///
  /// A loop that outlives the timeout is logged and left to finish on its own.
  pub async fn stop(&self) {
    self.cancel.cancel();
    let Some(task) = self.task.lock().await.take() else {
      return;
    };

    match tokio::time::timeout(self.join_timeout, task).await {
      Ok(Ok(())) => debug!(root = %self.root.display(), "Watcher stopped"),
      Ok(Err(e)) => warn!(root = %self.root.display(), error = %e, "Watcher task failed"),
      Err(_) => warn!(
        root = %self.root.display(),
        timeout_secs = self.join_timeout.as_secs(),
        "Watcher did not stop in time, detaching"
      ),
    }
  }
}

impl Drop for FileSystemWatcher {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

// ============================================================================
// Event loop and workers
// ============================================================================

struct EventLoop {
  dispatcher: EventDispatcher,
  engine: Arc<SyncEngine>,
  permits: Arc<Semaphore>,
  /// Upserts and resyncs wait this long before reading, so they see the end of a burst
  settle: Duration,
  cancel: CancellationToken,
  event_rx: mpsc::Receiver<notify::Result<Event>>,
  // Dropping the notify watcher stops its thread
  _watcher: RecommendedWatcher,
}

impl EventLoop {
  async fn run(mut self) {
    let root = self.engine.root().clone();
    info!(root = %root, "Watcher event loop started");

    loop {
      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          debug!(root = %root, "Watcher cancelled");
          break;
        }

        event = self.event_rx.recv() => {
          match event {
            Some(Ok(event)) => {
              for fs_event in FsEvent::from_notify(event, Instant::now()) {
                if let Some(dispatch) = self.dispatcher.route(&fs_event) {
                  self.dispatch(dispatch);
                }
              }
            }
            Some(Err(e)) => warn!(root = %root, error = %e, "Watcher error"),
            None => {
              debug!(root = %root, "Watcher channel closed");
              break;
            }
          }
        }
      }
    }

    info!(root = %root, "Watcher event loop stopped");
  }

  fn dispatch(&self, dispatch: Dispatch) {
    let engine = self.engine.clone();
    let permits = self.permits.clone();
    let settle = self.settle;

    tokio::spawn(async move {
      let Ok(_permit) = permits.acquire_owned().await else {
        return;
      };
      match run_job(&engine, dispatch, settle).await {
        Ok(()) => {}
        Err(e @ SyncError::Closed(_)) => debug!(error = %e, "Dropping work for closed engine"),
        Err(e) => warn!(root = %engine.root(), error = %e, "Watcher job failed"),
      }
    });
  }
}

async fn run_job(engine: &SyncEngine, dispatch: Dispatch, settle: Duration) -> Result<(), SyncError> {
  match dispatch {
    // Newly ignored files are dropped and newly allowed ones indexed
    Dispatch::ReloadRules | Dispatch::Resync => {
      tokio::time::sleep(settle).await;
      engine.sync_project().await?;
    }
    Dispatch::Upsert(path) => {
      tokio::time::sleep(settle).await;
      upsert_if_changed(engine, &path).await?;
    }
    Dispatch::Delete(path) => {
      engine.delete_tree(&path).await?;
    }
    Dispatch::Move { from, to } => {
      engine.move_file(from.as_deref(), to.as_deref()).await?;
    }
  }
  Ok(())
}

/// Upsert `path` only when its content differs from what is stored
pub async fn upsert_if_changed(engine: &SyncEngine, path: &Path) -> Result<Option<UpsertOutcome>, SyncError> {
  let rel = engine.relative_path(path)?;

  match engine.hasher().fingerprint(path).await {
    Fingerprint::Hash(hash) => {
      if engine.stored_hash(&rel).await?.as_deref() == Some(hash.as_str()) {
        trace!(path = %rel, "Content unchanged, skipping");
        return Ok(None);
      }
      engine.upsert_file(path).await.map(Some)
    }
    Fingerprint::Ineligible => {
      // Only worth a write if something is indexed for it
      if engine.stored_hash(&rel).await?.is_some() {
        engine.upsert_file(path).await.map(Some)
      } else {
        Ok(None)
      }
    }
    Fingerprint::Missing => {
      engine.delete_file(path).await?;
      Ok(Some(UpsertOutcome::Removed))
    }
    Fingerprint::Unreadable => Ok(None),
  }
}
