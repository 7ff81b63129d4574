//! Per-file building blocks used by the sync engine and the watcher
//!
//! ```text
//! path ──► IgnoreRuleSet ──► ContentHasher ──► ChunkingPolicy ──► segments
//!          (excluded?)       (read + hash)     (whole / split)
//! ```

pub mod chunker;
pub mod hash;
pub mod ignore;
mod language;
mod splitter;

pub use chunker::ChunkingPolicy;
pub use hash::{ContentHasher, FileRead, Fingerprint};
pub use ignore::IgnoreRuleSet;
pub use language::Language;
