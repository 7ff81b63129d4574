//! Keep a project synced until interrupted

use std::sync::Arc;

use anyhow::{Context, Result};
use codesync::{ProjectRegistry, config::Config, project::ProjectRoot};
use tracing::info;

use super::context::store_provider;

pub async fn cmd_watch(root: &ProjectRoot, config: Config) -> Result<()> {
  let registry = Arc::new(ProjectRegistry::new(store_provider(&config), config));

  let engine = registry
    .ensure_initialized(root.as_path())
    .await
    .with_context(|| format!("Failed to activate {}", root))?;

  let status = engine.status().await.context("Failed to read index status")?;
  println!(
    "Watching {} ({} files, {} chunks). Press Ctrl-C to stop.",
    root, status.files, status.chunks
  );

  tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
  info!(root = %root, "Interrupted, shutting down");

  registry.release(root.as_path()).await;
  registry.shutdown().await;
  Ok(())
}
