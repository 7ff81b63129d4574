use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::{EmbeddingError, EmbeddingMode, EmbeddingProvider};
use crate::domain::config::EmbeddingConfig;

#[derive(Debug, Clone)]
pub struct OllamaProvider {
  client: reqwest::Client,
  base_url: String,
  model: String,
  dimensions: usize,
  max_batch_size: usize,
  document_prefix: String,
  query_prefix: String,
}

impl OllamaProvider {
  pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
    let client = reqwest::Client::builder().timeout(config.timeout()).build()?;

    info!(
      base_url = %config.ollama_url,
      model = %config.model,
      dimensions = config.dimensions,
      max_batch_size = config.max_batch_size,
      "Ollama provider initialized"
    );

    Ok(Self {
      client,
      base_url: config.ollama_url.trim_end_matches('/').to_string(),
      model: config.model.clone(),
      dimensions: config.dimensions,
      max_batch_size: config.max_batch_size.max(1),
      document_prefix: config.document_prefix.clone(),
      query_prefix: config.query_prefix.clone(),
    })
  }

  fn embed_url(&self) -> String {
    format!("{}/api/embed", self.base_url)
  }

  fn format_for_embedding(&self, text: &str, mode: EmbeddingMode) -> String {
    match mode {
      EmbeddingMode::Document => format!("{}{}", self.document_prefix, text),
      EmbeddingMode::Query => format!("{}{}", self.query_prefix, text),
    }
  }

  /// One request against `/api/embed`
  #[tracing::instrument(level = "trace", skip(self, texts), fields(batch_size = texts.len()))]
  async fn embed_single_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let request = BatchEmbeddingRequest {
      model: &self.model,
      input: texts.to_vec(),
    };

    let start = Instant::now();
    let response = self.client.post(self.embed_url()).json(&request).send().await.map_err(|e| {
      if e.is_timeout() {
        EmbeddingError::Timeout
      } else {
        EmbeddingError::Request(e)
      }
    })?;

    trace!(
      status = %response.status(),
      elapsed_ms = start.elapsed().as_millis(),
      "Received batch embedding response"
    );

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!(status = %status, batch_size = texts.len(), model = %self.model, "Ollama batch embedding failed");
      return Err(EmbeddingError::ProviderError(format!(
        "Ollama returned {}: {}",
        status, body
      )));
    }

    let result: BatchEmbeddingResponse = response.json().await?;

    if result.embeddings.len() != texts.len() {
      return Err(EmbeddingError::ProviderError(format!(
        "Batch size mismatch: got {} embeddings for {} inputs",
        result.embeddings.len(),
        texts.len()
      )));
    }

    if let Some(bad) = result.embeddings.iter().find(|e| e.len() != self.dimensions) {
      return Err(EmbeddingError::ProviderError(format!(
        "Expected {} dimensions, got {}",
        self.dimensions,
        bad.len()
      )));
    }

    Ok(result.embeddings)
  }
}

#[derive(Debug, Serialize)]
struct BatchEmbeddingRequest<'a> {
  model: &'a str,
  input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbeddingResponse {
  embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
  fn name(&self) -> &str {
    "ollama"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
    let mut embeddings = self.embed_batch(&[text], mode).await?;
    embeddings
      .pop()
      .ok_or_else(|| EmbeddingError::ProviderError("empty embedding response".to_string()))
  }

  async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let formatted: Vec<String> = texts.iter().map(|t| self.format_for_embedding(t, mode)).collect();
    let formatted_refs: Vec<&str> = formatted.iter().map(|s| s.as_str()).collect();

    debug!(batch_size = texts.len(), mode = ?mode, model = %self.model, "Embedding batch");

    let mut all = Vec::with_capacity(texts.len());
    for batch in formatted_refs.chunks(self.max_batch_size) {
      all.extend(self.embed_single_batch(batch).await?);
    }
    Ok(all)
  }
}
