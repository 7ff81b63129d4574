// Chunk table operations

use std::sync::Arc;

use arrow_array::{
  Array, BooleanArray, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray,
  UInt32Array,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::{
  DistanceType,
  index::{Index, scalar::FtsIndexBuilder, vector::IvfPqIndexBuilder},
  query::{ExecutableQuery, QueryBase, Select},
};
use tracing::{debug, info, trace};

use super::{
  connection::{DbError, ProjectDb, Result},
  schema::{METADATA_COLUMNS, chunks_schema},
  store::ChunkStore,
};
use crate::{
  domain::chunk::{Chunk, ChunkFilter, ChunkMetadata, SearchHit},
  embedding::EmbeddingMode,
};

/// Below this row count a vector index costs more than a flat scan
const VECTOR_INDEX_MIN_ROWS: usize = 2000;
const MAX_SUB_VECTORS: usize = 96;

#[async_trait]
impl ChunkStore for ProjectDb {
  #[tracing::instrument(level = "trace", skip(self, chunks), fields(batch_size = chunks.len()))]
  async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
    if chunks.is_empty() {
      return Ok(());
    }

    let provider = self.embedding.get().await?;
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let vectors = provider.embed_batch(&texts, EmbeddingMode::Document).await?;
    if vectors.len() != chunks.len() {
      return Err(DbError::InvalidInput(format!(
        "got {} vectors for {} chunks",
        vectors.len(),
        chunks.len()
      )));
    }

    trace!(table = %self.table_name, operation = "upsert", batch_size = chunks.len(), "Upserting chunks");

    let table = self.table_or_create().await?;
    let batch = chunks_to_batch(chunks, &vectors, self.vector_dim)?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], chunks_schema(self.vector_dim));

    let mut merge_insert = table.merge_insert(&["id"]);
    merge_insert.when_matched_update_all(None).when_not_matched_insert_all();
    merge_insert.execute(Box::new(batches)).await?;
    Ok(())
  }

  async fn delete_where(&self, filter: &ChunkFilter) -> Result<()> {
    let Some(table) = self.existing_table().await? else {
      trace!(table = %self.table_name, "Delete on missing table, nothing to do");
      return Ok(());
    };

    let predicate = filter.to_sql().unwrap_or_else(|| "true".to_string());
    debug!(table = %self.table_name, operation = "delete", predicate = %predicate, "Deleting chunks");
    table.delete(&predicate).await?;
    Ok(())
  }

  async fn search(&self, query: &str, limit: usize, filter: Option<&ChunkFilter>) -> Result<Vec<SearchHit>> {
    let Some(table) = self.existing_table().await? else {
      return Ok(Vec::new());
    };

    debug!(
      table = %self.table_name,
      operation = "search",
      limit = limit,
      has_filter = filter.is_some(),
      "Searching chunks"
    );

    let provider = self.embedding.get().await?;
    let query_vector = provider.embed(query, EmbeddingMode::Query).await?;

    let search = table
      .vector_search(query_vector)?
      .distance_type(DistanceType::Cosine)
      .limit(limit);
    let search = match filter.and_then(|f| f.to_sql()) {
      Some(predicate) => search.only_if(predicate),
      None => search,
    };

    let results: Vec<RecordBatch> = search.execute().await?.try_collect().await?;

    let mut hits = Vec::new();
    for batch in results {
      for row in 0..batch.num_rows() {
        let metadata = batch_to_metadata(&batch, row)?;
        let text = string_column(&batch, "text", row)?;
        let score = batch
          .column_by_name("_distance")
          .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
          .map(|arr| arr.value(row))
          .unwrap_or(0.0);
        hits.push(SearchHit { text, metadata, score });
      }
    }

    debug!(table = %self.table_name, operation = "search", results = hits.len(), "Search complete");
    Ok(hits)
  }

  #[tracing::instrument(level = "trace", skip(self))]
  async fn list(&self, filter: &ChunkFilter) -> Result<Vec<ChunkMetadata>> {
    let Some(table) = self.existing_table().await? else {
      return Ok(Vec::new());
    };

    let query = table.query().select(Select::columns(METADATA_COLUMNS));
    let query = match filter.to_sql() {
      Some(predicate) => query.only_if(predicate),
      None => query,
    };

    let results: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

    let mut records = Vec::new();
    for batch in results {
      for row in 0..batch.num_rows() {
        records.push(batch_to_metadata(&batch, row)?);
      }
    }
    Ok(records)
  }

  async fn exists(&self) -> Result<bool> {
    self.table_exists().await
  }

  async fn row_count(&self) -> Result<usize> {
    match self.existing_table().await? {
      Some(table) => Ok(table.count_rows(None).await?),
      None => Ok(0),
    }
  }

  async fn rebuild_secondary_indexes(&self) -> Result<()> {
    let Some(table) = self.existing_table().await? else {
      return Ok(());
    };

    table
      .create_index(&["text"], Index::FTS(FtsIndexBuilder::default()))
      .replace(true)
      .execute()
      .await?;
    debug!(table = %self.table_name, "Full-text index rebuilt");

    let rows = table.count_rows(None).await?;
    if rows <= VECTOR_INDEX_MIN_ROWS {
      debug!(table = %self.table_name, rows, "Skipping vector index for small table");
      return Ok(());
    }

    let partitions = ivf_partitions(rows);
    let sub_vectors = pq_sub_vectors(self.vector_dim);
    table
      .create_index(
        &["vector"],
        Index::IvfPq(
          IvfPqIndexBuilder::default()
            .distance_type(DistanceType::Cosine)
            .num_partitions(partitions)
            .num_sub_vectors(sub_vectors),
        ),
      )
      .replace(true)
      .execute()
      .await?;

    info!(table = %self.table_name, rows, partitions, sub_vectors, "Vector index rebuilt");
    Ok(())
  }
}

/// `2^floor(log2(rows / 20))`, clamped to 2..=256
fn ivf_partitions(rows: usize) -> u32 {
  let target = (rows / 20).max(1);
  let power = usize::BITS - 1 - target.leading_zeros();
  (1u32 << power.min(8)).clamp(2, 256)
}

/// Largest divisor of `dim` not above [`MAX_SUB_VECTORS`]
fn pq_sub_vectors(dim: usize) -> u32 {
  (1..=MAX_SUB_VECTORS.min(dim.max(1)))
    .rev()
    .find(|d| dim % d == 0)
    .unwrap_or(1) as u32
}

// ============================================================================
// Batch conversion
// ============================================================================

fn chunks_to_batch(chunks: &[Chunk], vectors: &[Vec<f32>], vector_dim: usize) -> Result<RecordBatch> {
  let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
  let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
  let paths: Vec<&str> = chunks.iter().map(|c| c.metadata.path.as_str()).collect();
  let hashes: Vec<&str> = chunks.iter().map(|c| c.metadata.hash.as_str()).collect();
  let indexes: Vec<u32> = chunks.iter().map(|c| c.metadata.chunk_index).collect();
  let totals: Vec<u32> = chunks.iter().map(|c| c.metadata.total_chunks).collect();
  let whole: Vec<bool> = chunks.iter().map(|c| c.metadata.is_whole_file).collect();
  let modified: Vec<i64> = chunks
    .iter()
    .map(|c| c.metadata.last_modified.timestamp_millis())
    .collect();

  let mut all_vectors: Vec<f32> = Vec::with_capacity(chunks.len() * vector_dim);
  for vector in vectors {
    if vector.len() != vector_dim {
      return Err(DbError::InvalidInput(format!(
        "vector has {} dimensions, table expects {}",
        vector.len(),
        vector_dim
      )));
    }
    all_vectors.extend_from_slice(vector);
  }

  let field = Arc::new(arrow_schema::Field::new("item", arrow_schema::DataType::Float32, true));
  let vector_list = FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(Float32Array::from(all_vectors)), None)?;

  let batch = RecordBatch::try_new(
    chunks_schema(vector_dim),
    vec![
      Arc::new(StringArray::from(ids)),
      Arc::new(StringArray::from(texts)),
      Arc::new(StringArray::from(paths)),
      Arc::new(StringArray::from(hashes)),
      Arc::new(UInt32Array::from(indexes)),
      Arc::new(UInt32Array::from(totals)),
      Arc::new(BooleanArray::from(whole)),
      Arc::new(Int64Array::from(modified)),
      Arc::new(vector_list),
    ],
  )?;

  Ok(batch)
}

fn string_column(batch: &RecordBatch, name: &str, row: usize) -> Result<String> {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
    .map(|a| a.value(row).to_string())
    .ok_or_else(|| DbError::NotFound(format!("column {}", name)))
}

/// Convert a RecordBatch row to chunk metadata
fn batch_to_metadata(batch: &RecordBatch, row: usize) -> Result<ChunkMetadata> {
  let get_u32 = |name: &str| -> Result<u32> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
      .map(|a| a.value(row))
      .ok_or_else(|| DbError::NotFound(format!("column {}", name)))
  };

  let is_whole_file = batch
    .column_by_name("is_whole_file")
    .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
    .map(|a| a.value(row))
    .ok_or_else(|| DbError::NotFound("column is_whole_file".into()))?;

  let last_modified_ms = batch
    .column_by_name("last_modified")
    .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
    .map(|a| a.value(row))
    .ok_or_else(|| DbError::NotFound("column last_modified".into()))?;

  Ok(ChunkMetadata {
    path: string_column(batch, "path", row)?,
    hash: string_column(batch, "hash", row)?,
    chunk_index: get_u32("chunk_index")?,
    total_chunks: get_u32("total_chunks")?,
    is_whole_file,
    last_modified: Utc
      .timestamp_millis_opt(last_modified_ms)
      .single()
      .ok_or_else(|| DbError::InvalidInput(format!("bad timestamp {}", last_modified_ms)))?,
  })
}
