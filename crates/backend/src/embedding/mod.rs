//! Embedding backends
//!
//! One provider is shared by every active project. [`SharedEmbedding`] creates
//! it on first use and hands out the same instance afterwards.

mod ollama;
mod shared;

use std::sync::Arc;

pub use ollama::OllamaProvider;
pub use shared::SharedEmbedding;

use crate::domain::config::{EmbeddingConfig, EmbeddingProvider as ConfigEmbeddingProvider};

/// Whether text is being stored or used to search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingMode {
  #[default]
  Document,
  Query,
}

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;
  fn dimensions(&self) -> usize;

  async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError>;
  async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

impl dyn EmbeddingProvider {
  pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider {
      ConfigEmbeddingProvider::Ollama => {
        let provider = OllamaProvider::new(config)?;

        Ok(Arc::new(provider))
      }
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Provider error: {0}")]
  ProviderError(String),
  #[error("Request timed out")]
  Timeout,
}
