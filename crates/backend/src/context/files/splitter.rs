//! Recursive separator splitter
//!
//! Splits on the strongest separator present in the text, keeps the separator
//! at the start of the following piece, recurses into pieces that are still too
//! long, then merges adjacent pieces back up to `chunk_size` characters while
//! carrying up to `overlap` characters into the next chunk.

use std::collections::VecDeque;

use tracing::trace;

/// Paragraph → line → tag → word → character
pub const GENERIC_SEPARATORS: &[&str] = &["\n\n", "\n", ">", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct RecursiveSplitter<'a> {
  chunk_size: usize,
  overlap: usize,
  separators: &'a [&'a str],
}

impl<'a> RecursiveSplitter<'a> {
  pub fn new(chunk_size: usize, overlap: usize, separators: &'a [&'a str]) -> Self {
    Self {
      chunk_size: chunk_size.max(1),
      overlap: overlap.min(chunk_size.saturating_sub(1)),
      separators,
    }
  }

  pub fn split(&self, text: &str) -> Vec<String> {
    self.split_with(text, self.separators)
  }

  fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
    let mut separator = separators.last().copied().unwrap_or("");
    let mut finer: &[&str] = &[];
    for (i, candidate) in separators.iter().enumerate() {
      if candidate.is_empty() {
        separator = candidate;
        break;
      }
      if text.contains(candidate) {
        separator = candidate;
        finer = &separators[i + 1..];
        break;
      }
    }

    let mut chunks = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();

    for piece in split_keep_start(text, separator) {
      if char_len(piece) < self.chunk_size {
        fitting.push(piece);
        continue;
      }

      if !fitting.is_empty() {
        chunks.extend(self.merge(&fitting));
        fitting.clear();
      }

      if finer.is_empty() {
        chunks.push(piece.to_string());
      } else {
        chunks.extend(self.split_with(piece, finer));
      }
    }

    if !fitting.is_empty() {
      chunks.extend(self.merge(&fitting));
    }

    chunks
  }

  fn merge(&self, pieces: &[&str]) -> Vec<String> {
    let mut docs = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
      let len = char_len(piece);

      if total + len > self.chunk_size && !window.is_empty() {
        if let Some(doc) = join(&window) {
          docs.push(doc);
        }

        while total > self.overlap || (total + len > self.chunk_size && total > 0) {
          match window.pop_front() {
            Some((_, dropped)) => total -= dropped,
            None => break,
          }
        }
      }

      window.push_back((piece, len));
      total += len;
    }

    if let Some(doc) = join(&window) {
      docs.push(doc);
    }

    trace!(pieces = pieces.len(), chunks = docs.len(), "Merged split pieces");
    docs
  }
}

fn split_keep_start<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
  if separator.is_empty() {
    return text
      .char_indices()
      .map(|(i, c)| &text[i..i + c.len_utf8()])
      .collect();
  }

  let mut pieces = Vec::new();
  let mut start = 0;
  for (idx, _) in text.match_indices(separator) {
    if idx > start {
      pieces.push(&text[start..idx]);
    }
    start = idx;
  }
  pieces.push(&text[start..]);
  pieces.retain(|p| !p.is_empty());
  pieces
}

fn join(window: &VecDeque<(&str, usize)>) -> Option<String> {
  let text: String = window.iter().map(|(piece, _)| *piece).collect();
  let trimmed = text.trim();
  if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

fn char_len(s: &str) -> usize {
  s.chars().count()
}
