use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use super::{EmbeddingError, EmbeddingProvider};
use crate::domain::config::EmbeddingConfig;

/// Process-scoped embedding provider, created on first use.
///
/// Concurrent first callers race on the cell; exactly one provider is built and
/// every caller gets the same `Arc`. A failed build leaves the cell empty so the
/// next caller retries.
pub struct SharedEmbedding {
  config: EmbeddingConfig,
  cell: OnceCell<Arc<dyn EmbeddingProvider>>,
}

impl SharedEmbedding {
  pub fn new(config: EmbeddingConfig) -> Self {
    Self {
      config,
      cell: OnceCell::new(),
    }
  }

  /// Already-initialized instance wrapping `provider`
  pub fn with_provider(provider: Arc<dyn EmbeddingProvider>) -> Self {
    Self {
      config: EmbeddingConfig {
        dimensions: provider.dimensions(),
        ..Default::default()
      },
      cell: OnceCell::new_with(Some(provider)),
    }
  }

  pub fn dimensions(&self) -> usize {
    self.cell.get().map(|p| p.dimensions()).unwrap_or(self.config.dimensions)
  }

  pub fn is_initialized(&self) -> bool {
    self.cell.initialized()
  }

  pub async fn get(&self) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let provider = self
      .cell
      .get_or_try_init(|| async {
        info!(model = %self.config.model, "Loading embedding provider");
        <dyn EmbeddingProvider>::from_config(&self.config)
      })
      .await?;
    Ok(provider.clone())
  }
}
