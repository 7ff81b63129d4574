//! Wiring shared by every command: project root, config and storage

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use codesync::{
  LanceStoreProvider, SharedEmbedding, SyncEngine, config::Config, db::StoreProvider, project::ProjectRoot,
};

/// Resolve `path` (default: current directory) to a project root
pub fn project_root(path: Option<&Path>) -> Result<ProjectRoot> {
  let path = match path {
    Some(path) => path.to_path_buf(),
    None => std::env::current_dir().context("Failed to read current directory")?,
  };
  ProjectRoot::resolve(&path).with_context(|| format!("Project root not found: {}", path.display()))
}

/// LanceDB storage with the configured embedding provider
pub fn store_provider(config: &Config) -> Arc<LanceStoreProvider> {
  let embedding = Arc::new(SharedEmbedding::new(config.embedding.clone()));
  Arc::new(LanceStoreProvider::new(embedding))
}

/// An engine over the project's collection, without a watcher
pub async fn open_engine(root: &ProjectRoot, config: &Config) -> Result<SyncEngine> {
  let store = store_provider(config)
    .open(root, &config.index.table_name)
    .await
    .with_context(|| format!("Failed to open index for {}", root))?;
  Ok(SyncEngine::new(root.clone(), store, &config.index))
}
