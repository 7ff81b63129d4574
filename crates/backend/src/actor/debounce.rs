//! Per-path cooldown for filesystem events
//!
//! Editors often emit several events for one save (truncate, write, chmod,
//! rename-into-place). Only the first event for a path inside the cooldown
//! window is dispatched; the rest are dropped.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  time::{Duration, Instant},
};

use tracing::trace;

/// Entries older than this many cooldowns are pruned
const PRUNE_FACTOR: u32 = 8;

/// Soft cap before a prune pass runs
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug)]
pub struct Debouncer {
  cooldown: Duration,
  last_dispatched: HashMap<PathBuf, Instant>,
}

impl Debouncer {
  pub fn new(cooldown: Duration) -> Self {
    Self {
      cooldown,
      last_dispatched: HashMap::new(),
    }
  }

  /// Whether an event for `path` at `now` should be dispatched. Records the dispatch if so.
  pub fn should_dispatch(&mut self, path: &Path, now: Instant) -> bool {
    if let Some(last) = self.last_dispatched.get(path)
      && now.saturating_duration_since(*last) < self.cooldown
    {
      trace!(path = %path.display(), "Debounced event");
      return false;
    }

    self.last_dispatched.insert(path.to_path_buf(), now);
    if self.last_dispatched.len() > PRUNE_THRESHOLD {
      self.prune(now);
    }
    true
  }

  /// Forget `path`, so the next event for it dispatches immediately
  pub fn forget(&mut self, path: &Path) {
    self.last_dispatched.remove(path);
  }

  pub fn len(&self) -> usize {
    self.last_dispatched.len()
  }

  pub fn is_empty(&self) -> bool {
    self.last_dispatched.is_empty()
  }

  fn prune(&mut self, now: Instant) {
    let horizon = self.cooldown * PRUNE_FACTOR;
    self
      .last_dispatched
      .retain(|_, last| now.saturating_duration_since(*last) < horizon);
  }
}
