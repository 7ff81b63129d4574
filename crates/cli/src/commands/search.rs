//! Query a project's index

use anyhow::{Context, Result};
use codesync::{config::Config, project::ProjectRoot};

use super::context::open_engine;

/// Lines of each hit shown in text output
const PREVIEW_LINES: usize = 6;

pub async fn cmd_search(root: &ProjectRoot, config: &Config, query: &str, limit: usize, json_output: bool) -> Result<()> {
  let engine = open_engine(root, config).await?;
  let hits = engine.search(query, limit).await.context("Search failed")?;

  if json_output {
    println!("{}", serde_json::to_string_pretty(&hits)?);
    return Ok(());
  }

  if hits.is_empty() {
    println!("No code found for: {}", query);
    return Ok(());
  }

  println!("Found {} chunks:\n", hits.len());
  for (i, hit) in hits.iter().enumerate() {
    println!(
      "{}. {} [{}/{}]",
      i + 1,
      hit.metadata.path,
      hit.metadata.chunk_index + 1,
      hit.metadata.total_chunks
    );
    println!("   Score: {:.3}", hit.score);

    // Skip the <file> wrapper line
    let preview: Vec<&str> = hit.text.lines().skip(1).take(PREVIEW_LINES).collect();
    println!("   {}", preview.join("\n   "));
    println!();
  }

  Ok(())
}
