//! codesync - keep an embedding index of a source tree in sync with its files

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use codesync::config::Config;

mod commands;
mod logging;

use commands::{cmd_search, cmd_status, cmd_sync, cmd_watch, project_root};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "codesync")]
#[command(about = "Keep a semantic code index in sync with your project")]
#[command(after_help = "\
QUICK START:
  codesync sync                   # Index the current directory once
  codesync watch                  # Index, then follow file changes
  codesync search . \"query\"       # Search the index")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Sync a project and keep it synced until Ctrl-C
  Watch {
    /// Project root (default: current directory)
    root: Option<PathBuf>,
  },
  /// Run one full reconciliation pass
  Sync {
    /// Project root (default: current directory)
    root: Option<PathBuf>,
    /// Drop the existing index first
    #[arg(long)]
    reset: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Search a project's index
  Search {
    /// Project root
    root: PathBuf,
    /// Search query
    query: String,
    #[arg(short, long, default_value = "10")]
    limit: usize,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Show how much of a project is indexed
  Status {
    /// Project root (default: current directory)
    root: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

impl Commands {
  fn root(&self) -> Option<&std::path::Path> {
    match self {
      Commands::Watch { root } | Commands::Sync { root, .. } | Commands::Status { root, .. } => root.as_deref(),
      Commands::Search { root, .. } => Some(root.as_path()),
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let root = project_root(cli.command.root())?;
  let config = Config::load_for_project(root.as_path());
  let _guard = init_logging(&config.log);

  match cli.command {
    Commands::Watch { .. } => cmd_watch(&root, config).await,
    Commands::Sync { reset, json, .. } => cmd_sync(&root, &config, reset, json).await,
    Commands::Search {
      query, limit, json, ..
    } => cmd_search(&root, &config, &query, limit, json).await,
    Commands::Status { json, .. } => cmd_status(&root, &config, json).await,
  }
}
