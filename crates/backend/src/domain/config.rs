//! Configuration for the sync engine, watcher, registry and embedding backend.
//!
//! Loaded from TOML. Every section is `#[serde(default)]` so a partial file
//! only overrides what it names.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::{Deserialize, Serialize};

use super::project::PROJECT_STATE_DIR;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub index: IndexConfig,
  pub watcher: WatcherSettings,
  pub registry: RegistryConfig,
  pub embedding: EmbeddingConfig,
  pub log: LogConfig,
}

impl Config {
  /// Load config for a project root.
  ///
  /// Priority: `<root>/.codesync/config.toml`, then the user config, then defaults.
  pub fn load_for_project(project_path: &Path) -> Self {
    let project_config = Self::project_config_path(project_path);
    if project_config.exists()
      && let Ok(content) = std::fs::read_to_string(&project_config)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
      && let Ok(content) = std::fs::read_to_string(&user_config_path)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    Self::default()
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CODESYNC_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("codesync").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("codesync").join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(PROJECT_STATE_DIR).join("config.toml")
  }
}

// ============================================================================
// Index Configuration
// ============================================================================

/// Hashing and chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
  /// Files with fewer characters than this are stored as a single chunk (default: 30000)
  pub small_file_threshold: usize,

  /// Chunk size for the language-aware splitter, in characters (default: 30000)
  pub code_chunk_size: usize,

  /// Overlap carried between language-aware chunks (default: 2000)
  pub code_chunk_overlap: usize,

  /// Chunk size for the generic splitter (default: 4000)
  pub fallback_chunk_size: usize,

  /// Overlap carried between generic chunks (default: 200)
  pub fallback_chunk_overlap: usize,

  /// Bytes inspected for a NUL when detecting binary files (default: 1024)
  pub binary_probe_bytes: usize,

  /// Attempts made when a read fails with a transient error (default: 5)
  pub read_retries: u32,

  /// Delay between read attempts in milliseconds (default: 200)
  pub read_retry_delay_ms: u64,

  /// Storage table holding the project's chunks
  pub table_name: String,
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self {
      small_file_threshold: 30_000,
      code_chunk_size: 30_000,
      code_chunk_overlap: 2_000,
      fallback_chunk_size: 4_000,
      fallback_chunk_overlap: 200,
      binary_probe_bytes: 1024,
      read_retries: 5,
      read_retry_delay_ms: 200,
      table_name: "project_vectors".to_string(),
    }
  }
}

impl IndexConfig {
  pub fn read_retry_delay(&self) -> Duration {
    Duration::from_millis(self.read_retry_delay_ms)
  }
}

// ============================================================================
// Watcher Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
  /// Per-path cooldown in milliseconds; repeat events inside it are dropped (default: 1000)
  pub cooldown_ms: u64,

  /// Maximum dispatched workers running at once per project (default: 4)
  pub max_inflight: usize,

  /// Poll interval for backends that poll (default: 2)
  pub poll_interval_secs: u64,

  /// How long shutdown waits for the watcher task (default: 5)
  pub join_timeout_secs: u64,
}

impl Default for WatcherSettings {
  fn default() -> Self {
    Self {
      cooldown_ms: 1000,
      max_inflight: 4,
      poll_interval_secs: 2,
      join_timeout_secs: 5,
    }
  }
}

impl WatcherSettings {
  pub fn cooldown(&self) -> Duration {
    Duration::from_millis(self.cooldown_ms)
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs)
  }

  pub fn join_timeout(&self) -> Duration {
    Duration::from_secs(self.join_timeout_secs)
  }
}

// ============================================================================
// Registry Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
  /// Projects unused for longer than this are evicted, whatever their ref count (default: 1800)
  pub idle_timeout_secs: u64,

  /// Minimum gap between opportunistic idle sweeps (default: 1800)
  pub sweep_interval_secs: u64,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      idle_timeout_secs: 1800,
      sweep_interval_secs: 1800,
    }
  }
}

impl RegistryConfig {
  pub fn idle_timeout(&self) -> Duration {
    Duration::from_secs(self.idle_timeout_secs)
  }

  pub fn sweep_interval(&self) -> Duration {
    Duration::from_secs(self.sweep_interval_secs)
  }
}

// ============================================================================
// Embedding Configuration
// ============================================================================

/// Embedding backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
  #[default]
  Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  pub provider: EmbeddingProvider,
  pub model: String,
  pub dimensions: usize,
  pub ollama_url: String,
  /// Texts sent per embedding request (default: 32)
  pub max_batch_size: usize,
  /// Request timeout in seconds (default: 120)
  pub timeout_secs: u64,
  /// Prepended to chunk text before embedding
  pub document_prefix: String,
  /// Prepended to search queries before embedding
  pub query_prefix: String,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      provider: EmbeddingProvider::Ollama,
      model: "nomic-embed-text".to_string(),
      dimensions: 768,
      ollama_url: "http://localhost:11434".to_string(),
      max_batch_size: 32,
      timeout_secs: 120,
      document_prefix: "search_document: ".to_string(),
      query_prefix: "search_query: ".to_string(),
    }
  }
}

impl EmbeddingConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  pub level: String,

  /// Directory for a rolling log file; console only when unset
  pub directory: Option<PathBuf>,

  /// Log file rotation: "daily", "hourly", "never"
  pub rotation: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
      rotation: "daily".to_string(),
    }
  }
}
