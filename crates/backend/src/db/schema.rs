use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Schema for a project's chunk table
pub fn chunks_schema(vector_dim: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false), // "<path>#<index>"
    Field::new("text", DataType::Utf8, false),
    Field::new("path", DataType::Utf8, false),
    Field::new("hash", DataType::Utf8, false), // whole-file fingerprint
    Field::new("chunk_index", DataType::UInt32, false),
    Field::new("total_chunks", DataType::UInt32, false),
    Field::new("is_whole_file", DataType::Boolean, false),
    Field::new("last_modified", DataType::Int64, false), // Unix timestamp ms
    Field::new(
      "vector",
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), vector_dim as i32),
      false,
    ),
  ]))
}

/// Columns needed to rebuild [`ChunkMetadata`](crate::domain::chunk::ChunkMetadata)
pub const METADATA_COLUMNS: &[&str] = &[
  "path",
  "hash",
  "chunk_index",
  "total_chunks",
  "is_whole_file",
  "last_modified",
];
