//! Disk side of reconciliation: which files are eligible and what they hash to

use std::{
  collections::{HashMap, HashSet},
  path::{Path, PathBuf},
  time::{Duration, Instant},
};

use futures::{StreamExt, stream};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::{
  context::files::{ContentHasher, Fingerprint, IgnoreRuleSet},
  domain::project::relative_path,
};

/// Files hashed concurrently during a scan
const HASH_CONCURRENCY: usize = 16;

/// Fingerprints of every eligible file under a root
#[derive(Debug, Default)]
pub struct DiskScan {
  /// relative path -> fingerprint
  pub hashes: HashMap<String, String>,
  /// Present but unreadable. Their index entries must be kept.
  pub unreadable: HashSet<String>,
  /// Binary or blank files
  pub ineligible: usize,
  pub duration: Duration,
}

/// Walk `root`, honoring `rules` plus `.gitignore` files, and fingerprint what is left.
pub async fn scan_disk(root: &Path, rules: &IgnoreRuleSet, hasher: &ContentHasher) -> DiskScan {
  let start = Instant::now();

  let walk_root = root.to_path_buf();
  let walk_rules = rules.clone();
  let files = match tokio::task::spawn_blocking(move || list_files(&walk_root, walk_rules)).await {
    Ok(files) => files,
    Err(e) => {
      warn!(root = %root.display(), error = %e, "Directory walk aborted");
      Vec::new()
    }
  };

  let fingerprints: Vec<(String, Fingerprint)> = stream::iter(files)
    .map(|(rel, path)| async move {
      let fingerprint = hasher.fingerprint(&path).await;
      (rel, fingerprint)
    })
    .buffer_unordered(HASH_CONCURRENCY)
    .collect()
    .await;

  let mut scan = DiskScan::default();
  for (rel, fingerprint) in fingerprints {
    match fingerprint {
      Fingerprint::Hash(hash) => {
        scan.hashes.insert(rel, hash);
      }
      Fingerprint::Unreadable => {
        scan.unreadable.insert(rel);
      }
      Fingerprint::Ineligible => scan.ineligible += 1,
      // Deleted between the walk and the read
      Fingerprint::Missing => {}
    }
  }
  scan.duration = start.elapsed();

  debug!(
    root = %root.display(),
    files = scan.hashes.len(),
    unreadable = scan.unreadable.len(),
    ineligible = scan.ineligible,
    elapsed_ms = scan.duration.as_millis(),
    "Disk scan complete"
  );

  scan
}

fn list_files(root: &Path, rules: IgnoreRuleSet) -> Vec<(String, PathBuf)> {
  let filter_root = root.to_path_buf();
  let walker = WalkBuilder::new(root)
    .hidden(true)
    .git_ignore(true)
    .git_global(false)
    .git_exclude(false)
    .require_git(false)
    .ignore(false)
    .parents(false)
    .follow_links(false)
    .filter_entry(move |entry| {
      let Some(rel) = relative_path(&filter_root, entry.path()) else {
        return true;
      };
      if entry.file_type().is_some_and(|t| t.is_dir()) {
        !rules.is_ignored_dir(&rel)
      } else {
        !rules.is_ignored(&rel)
      }
    })
    .build();

  let mut files = Vec::new();
  for entry in walker {
    let entry = match entry {
      Ok(entry) => entry,
      Err(e) => {
        warn!(error = %e, "Skipping entry during scan");
        continue;
      }
    };

    if !entry.file_type().is_some_and(|t| t.is_file()) {
      continue;
    }

    if let Some(rel) = relative_path(root, entry.path()) {
      files.push((rel, entry.into_path()));
    }
  }
  files
}
