//! Chunk records stored in the index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed metadata carried by every chunk.
///
/// `hash` is the whole-file fingerprint, shared by every chunk of the file,
/// so looking up chunk 0 is enough to tell whether a file has drifted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
  pub path: String,
  pub hash: String,
  pub chunk_index: u32,
  pub total_chunks: u32,
  pub is_whole_file: bool,
  pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
  /// `"<relative_path>#<index>"`
  pub id: String,
  pub text: String,
  pub metadata: ChunkMetadata,
}

impl Chunk {
  pub fn id_for(path: &str, index: u32) -> String {
    format!("{}#{}", path, index)
  }

  /// Build the full chunk set for one file from its segments
  pub fn from_segments(path: &str, hash: &str, segments: Vec<String>, now: DateTime<Utc>) -> Vec<Chunk> {
    let total = segments.len() as u32;
    segments
      .into_iter()
      .enumerate()
      .map(|(i, text)| {
        let index = i as u32;
        Chunk {
          id: Self::id_for(path, index),
          text,
          metadata: ChunkMetadata {
            path: path.to_string(),
            hash: hash.to_string(),
            chunk_index: index,
            total_chunks: total,
            is_whole_file: total == 1,
            last_modified: now,
          },
        }
      })
      .collect()
  }
}

/// Metadata predicate used for deletes, lookups and filtered search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkFilter {
  pub path: Option<String>,
  pub chunk_index: Option<u32>,
}

impl ChunkFilter {
  /// Every chunk of one file
  pub fn path(path: &str) -> Self {
    Self {
      path: Some(path.to_string()),
      chunk_index: None,
    }
  }

  /// The canonical record of one file (chunk 0)
  pub fn head(path: &str) -> Self {
    Self {
      path: Some(path.to_string()),
      chunk_index: Some(0),
    }
  }

  /// Chunk 0 of every file
  pub fn heads() -> Self {
    Self {
      path: None,
      chunk_index: Some(0),
    }
  }

  pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
    self.path.as_deref().is_none_or(|p| p == metadata.path)
      && self.chunk_index.is_none_or(|i| i == metadata.chunk_index)
  }

  /// SQL predicate for backends that take one. `None` matches everything.
  pub fn to_sql(&self) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(path) = &self.path {
      clauses.push(format!("path = '{}'", path.replace('\'', "''")));
    }
    if let Some(index) = self.chunk_index {
      clauses.push(format!("chunk_index = {}", index));
    }
    if clauses.is_empty() { None } else { Some(clauses.join(" AND ")) }
  }
}

/// A search result as returned by the storage backend, in backend order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
  pub text: String,
  pub metadata: ChunkMetadata,
  /// Backend distance or relevance value, passed through untouched
  pub score: f32,
}
