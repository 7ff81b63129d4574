//! Content fingerprints and tolerant file reads

use std::{path::Path, time::Duration};

use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

use crate::domain::config::IndexConfig;

/// Outcome of reading a file for indexing
#[derive(Debug)]
pub enum FileRead {
  /// Indexable text content
  Text(String),
  /// NUL byte found in the probe window
  Binary,
  /// Empty or whitespace only
  Blank,
  /// The file does not exist
  Missing,
  /// Still failing after every retry. Not evidence of deletion.
  Unreadable(std::io::Error),
}

/// Outcome of fingerprinting a file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
  Hash(String),
  /// Present but not indexable (binary or blank)
  Ineligible,
  Missing,
  Unreadable,
}

/// Reads files with bounded retry and computes normalized content hashes
#[derive(Debug, Clone)]
pub struct ContentHasher {
  retries: u32,
  retry_delay: Duration,
  probe_bytes: usize,
}

impl ContentHasher {
  pub fn new(config: &IndexConfig) -> Self {
    Self {
      retries: config.read_retries.max(1),
      retry_delay: config.read_retry_delay(),
      probe_bytes: config.binary_probe_bytes,
    }
  }

  /// SHA-256 hex digest of `content` with every line ending normalized to `\n`
  pub fn hash(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    hex::encode(Sha256::digest(normalized.as_bytes()))
  }

  /// Read `path`, retrying transient failures
  pub async fn read(&self, path: &Path) -> FileRead {
    let mut attempt = 0;
    let bytes = loop {
      attempt += 1;
      match tokio::fs::read(path).await {
        Ok(bytes) => break bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return FileRead::Missing,
        Err(e) if attempt >= self.retries => {
          warn!(path = %path.display(), attempts = attempt, error = %e, "File unreadable after retries");
          return FileRead::Unreadable(e);
        }
        Err(e) => {
          trace!(path = %path.display(), attempt, error = %e, "Read failed, retrying");
          tokio::time::sleep(self.retry_delay).await;
        }
      }
    };

    if is_binary(&bytes, self.probe_bytes) {
      debug!(path = %path.display(), "Skipping binary file");
      return FileRead::Binary;
    }

    let content = String::from_utf8_lossy(&bytes).into_owned();
    if content.trim().is_empty() {
      return FileRead::Blank;
    }

    FileRead::Text(content)
  }

  /// Fingerprint of the file currently on disk
  pub async fn fingerprint(&self, path: &Path) -> Fingerprint {
    match self.read(path).await {
      FileRead::Text(content) => Fingerprint::Hash(Self::hash(&content)),
      FileRead::Binary | FileRead::Blank => Fingerprint::Ineligible,
      FileRead::Missing => Fingerprint::Missing,
      FileRead::Unreadable(_) => Fingerprint::Unreadable,
    }
  }
}

/// NUL byte within the first `probe` bytes
pub fn is_binary(bytes: &[u8], probe: usize) -> bool {
  bytes.iter().take(probe).any(|b| *b == 0)
}
