//! One reconciliation pass, no watcher

use anyhow::{Context, Result};
use codesync::{config::Config, project::ProjectRoot};

use super::context::open_engine;

pub async fn cmd_sync(root: &ProjectRoot, config: &Config, reset: bool, json_output: bool) -> Result<()> {
  let engine = open_engine(root, config).await?;

  if reset {
    engine.reset().await.context("Failed to reset index")?;
  }

  let report = engine.sync_project().await.context("Sync failed")?;

  if json_output {
    println!("{}", serde_json::to_string_pretty(&report)?);
    return Ok(());
  }

  println!("Synced {}", root);
  println!("  Files on disk: {}", report.scanned);
  println!("  Indexed:       {}", report.upserted);
  println!("  Removed:       {}", report.deleted);
  println!("  Unchanged:     {}", report.unchanged);
  if report.unreadable > 0 {
    println!("  Unreadable:    {}", report.unreadable);
  }
  if report.failed > 0 {
    println!("  Failed:        {} (see log)", report.failed);
  }
  println!("  Took {}ms", report.duration_ms);

  Ok(())
}
