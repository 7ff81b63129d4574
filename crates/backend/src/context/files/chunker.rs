//! Adaptive chunking: whole file below the size threshold, split above it

use std::path::Path;

use tracing::debug;

use super::{
  language::Language,
  splitter::{GENERIC_SEPARATORS, RecursiveSplitter},
};
use crate::domain::config::IndexConfig;

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
  #[error("{language} source has syntax errors")]
  Malformed { language: &'static str },
  #[error("splitter produced no segments")]
  Empty,
}

/// Decides how a file is cut into segments
#[derive(Debug, Clone)]
pub struct ChunkingPolicy {
  small_file_threshold: usize,
  code_chunk_size: usize,
  code_chunk_overlap: usize,
  fallback_chunk_size: usize,
  fallback_chunk_overlap: usize,
}

impl ChunkingPolicy {
  pub fn new(config: &IndexConfig) -> Self {
    Self {
      small_file_threshold: config.small_file_threshold,
      code_chunk_size: config.code_chunk_size,
      code_chunk_overlap: config.code_chunk_overlap,
      fallback_chunk_size: config.fallback_chunk_size,
      fallback_chunk_overlap: config.fallback_chunk_overlap,
    }
  }

  pub fn small_file_threshold(&self) -> usize {
    self.small_file_threshold
  }

  /// Ordered segments for `content`. Callers skip binary and blank files before this.
  pub fn chunk(&self, content: &str, rel_path: &str) -> Vec<String> {
    if content.chars().count() < self.small_file_threshold {
      return vec![content.to_string()];
    }

    let segments = match Language::from_path(rel_path) {
      Some(language) => match self.split_language(content, language) {
        Ok(segments) => segments,
        Err(e) => {
          debug!(path = rel_path, language = language.as_str(), error = %e, "Falling back to generic splitter");
          self.split_generic(content)
        }
      },
      None => self.split_generic(content),
    };

    if segments.is_empty() {
      vec![content.to_string()]
    } else {
      segments
    }
  }

  /// Boundary-preserving split for a known language
  pub fn split_language(&self, content: &str, language: Language) -> Result<Vec<String>, ChunkError> {
    if !language.parses_cleanly(content) {
      return Err(ChunkError::Malformed {
        language: language.as_str(),
      });
    }

    let segments =
      RecursiveSplitter::new(self.code_chunk_size, self.code_chunk_overlap, language.separators()).split(content);
    if segments.is_empty() {
      return Err(ChunkError::Empty);
    }
    Ok(segments)
  }

  /// Paragraph → line → space → character split
  pub fn split_generic(&self, content: &str) -> Vec<String> {
    RecursiveSplitter::new(self.fallback_chunk_size, self.fallback_chunk_overlap, GENERIC_SEPARATORS).split(content)
  }
}

/// Chunk text as stored: the segment wrapped in a marker naming its file
pub fn wrap_segment(rel_path: &str, segment: &str) -> String {
  let extension = Path::new(rel_path)
    .extension()
    .map(|ext| format!(".{}", ext.to_string_lossy()))
    .unwrap_or_default();
  format!("<file path=\"{}\" extension=\"{}\">\n{}\n</file>", rel_path, extension, segment)
}
