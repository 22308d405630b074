use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const TABLE_NAME: &str = "documents";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_VERSION: u32 = 1;

/// Columns of the `documents` table. `position` is the row's slot in the
/// in-memory arrays; `metadata` holds the document metadata as a JSON object.
pub fn build_arrow_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("position", DataType::Int32, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("metadata", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
