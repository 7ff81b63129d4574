//! Size of a project's index

use anyhow::{Context, Result};
use codesync::{config::Config, project::ProjectRoot};

use super::context::open_engine;

pub async fn cmd_status(root: &ProjectRoot, config: &Config, json_output: bool) -> Result<()> {
  let engine = open_engine(root, config).await?;
  let status = engine.status().await.context("Failed to read index status")?;

  if json_output {
    println!("{}", serde_json::to_string_pretty(&status)?);
    return Ok(());
  }

  println!("Project: {}", root);
  println!("  Files indexed: {}", status.files);
  println!("  Chunks:        {}", status.chunks);
  Ok(())
}
