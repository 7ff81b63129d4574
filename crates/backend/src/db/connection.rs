use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use lancedb::{Connection, Table, connect};
use thiserror::Error;
use tracing::{debug, error, info};

use super::{
  schema::chunks_schema,
  store::{ChunkStore, StoreProvider},
};
use crate::{
  domain::project::ProjectRoot,
  embedding::{EmbeddingError, SharedEmbedding},
};

#[derive(Error, Debug)]
pub enum DbError {
  #[error("LanceDB error: {0}")]
  Lance(#[from] lancedb::Error),
  #[error("Arrow error: {0}")]
  Arrow(#[from] arrow::error::ArrowError),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Embedding error: {0}")]
  Embedding(#[from] EmbeddingError),
  #[error("Not found: {0}")]
  NotFound(String),
  #[error("Invalid input: {0}")]
  InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// LanceDB-backed chunk collection for one project
pub struct ProjectDb {
  pub connection: Connection,
  pub table_name: String,
  pub(in crate::db) embedding: Arc<SharedEmbedding>,
  pub vector_dim: usize,
}

impl ProjectDb {
  /// Open the database under `<root>/.codesync/knowledge`
  pub async fn open(root: &ProjectRoot, table_name: &str, embedding: Arc<SharedEmbedding>) -> Result<Self> {
    Self::open_at_path(root.knowledge_dir(), table_name, embedding).await
  }

  /// Open database at a specific path. The chunk table is created on first write.
  pub async fn open_at_path(db_path: PathBuf, table_name: &str, embedding: Arc<SharedEmbedding>) -> Result<Self> {
    tokio::fs::create_dir_all(&db_path).await?;

    let vector_dim = embedding.dimensions();
    info!(path = %db_path.display(), table = table_name, vector_dim, "Opening database connection");
    let connection = match connect(db_path.to_string_lossy().as_ref()).execute().await {
      Ok(conn) => {
        debug!(path = %db_path.display(), "Database connection established");
        conn
      }
      Err(e) => {
        error!(path = %db_path.display(), err = %e, "Failed to connect to database");
        return Err(e.into());
      }
    };

    Ok(Self {
      connection,
      table_name: table_name.to_string(),
      embedding,
      vector_dim,
    })
  }

  pub(in crate::db) async fn table_exists(&self) -> Result<bool> {
    let names = self.connection.table_names().execute().await?;
    Ok(names.iter().any(|n| n == &self.table_name))
  }

  /// The chunk table, or `None` if nothing was ever written
  pub(in crate::db) async fn existing_table(&self) -> Result<Option<Table>> {
    if !self.table_exists().await? {
      return Ok(None);
    }
    Ok(Some(self.connection.open_table(&self.table_name).execute().await?))
  }

  pub(in crate::db) async fn table_or_create(&self) -> Result<Table> {
    if let Some(table) = self.existing_table().await? {
      return Ok(table);
    }

    debug!(table = %self.table_name, "Creating chunk table");
    Ok(
      self
        .connection
        .create_empty_table(&self.table_name, chunks_schema(self.vector_dim))
        .execute()
        .await?,
    )
  }
}

/// Opens a [`ProjectDb`] per project, sharing one embedding provider
pub struct LanceStoreProvider {
  embedding: Arc<SharedEmbedding>,
}

impl LanceStoreProvider {
  pub fn new(embedding: Arc<SharedEmbedding>) -> Self {
    Self { embedding }
  }
}

#[async_trait]
impl StoreProvider for LanceStoreProvider {
  async fn open(&self, root: &ProjectRoot, table_name: &str) -> Result<Arc<dyn ChunkStore>> {
    let db = ProjectDb::open(root, table_name, self.embedding.clone()).await?;
    Ok(Arc::new(db))
  }
}
