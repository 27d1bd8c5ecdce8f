use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// One row per chunk. The chunk record and its sparse weights are stored as
/// JSON; only `id`, `document_id` and `vector` are queried by column.
pub fn chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("document_id", DataType::Utf8, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("chunk_json", DataType::Utf8, false),
		Field::new("sparse_json", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
