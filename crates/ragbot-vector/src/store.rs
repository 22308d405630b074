//! On-disk persistence for `VectorIndex`.
//!
//! An index location is a directory holding a LanceDB database with one
//! `documents` table plus a `manifest.json`. The manifest is written last, so a
//! directory without one was never finished and is treated as corrupt.
//! `save` stages the whole directory next to its target and swaps it in with
//! renames: readers see either the old index or the new one.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Int32Type};
use arrow_array::{Array, ArrayRef, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::connect;
use lancedb::query::{ExecutableQuery, QueryBase};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ragbot_core::error::{Error, Result};
use ragbot_core::types::{Document, Meta};

use crate::index::VectorIndex;
use crate::schema::{build_arrow_schema, FORMAT_VERSION, MANIFEST_FILE, TABLE_NAME};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
	format_version: u32,
	domain_id: String,
	dimension: usize,
	count: usize,
	created_at: DateTime<Utc>,
}

fn storage(e: impl Display) -> Error { Error::Storage(e.to_string()) }

/// Persist `index` at `location`, replacing whatever was there.
pub async fn save(index: &VectorIndex, location: &Path) -> Result<()> {
	let parent = match location.parent() {
		Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
		_ => PathBuf::from("."),
	};
	std::fs::create_dir_all(&parent)?;
	let staging = tempfile::Builder::new().prefix(".ragbot-index-").tempdir_in(&parent)?;
	write_index(index, staging.path()).await?;
	swap_into_place(staging.path(), location)?;
	info!(domain = index.domain_id(), documents = index.len(), location = %location.display(), "saved vector index");
	Ok(())
}

async fn write_index(index: &VectorIndex, dir: &Path) -> Result<()> {
	let dim = i32::try_from(index.dimension()).map_err(storage)?;
	let schema = build_arrow_schema(dim);
	let batches = if index.is_empty() { Vec::new() } else { vec![Ok(to_record_batch(index, dim)?)] };
	let reader = Box::new(RecordBatchIterator::new(batches.into_iter(), schema));

	let db = connect(dir.to_string_lossy().as_ref()).execute().await.map_err(storage)?;
	db.create_table(TABLE_NAME, reader).execute().await.map_err(storage)?;

	let manifest = Manifest {
		format_version: FORMAT_VERSION,
		domain_id: index.domain_id().to_string(),
		dimension: index.dimension(),
		count: index.len(),
		created_at: Utc::now(),
	};
	let raw = serde_json::to_vec_pretty(&manifest).map_err(storage)?;
	std::fs::write(dir.join(MANIFEST_FILE), raw)?;
	Ok(())
}

fn to_record_batch(index: &VectorIndex, dim: i32) -> Result<RecordBatch> {
	let n = i32::try_from(index.len()).map_err(storage)?;
	let positions = Int32Array::from((0..n).collect::<Vec<_>>());
	let contents = StringArray::from(index.documents().iter().map(|d| d.content.as_str()).collect::<Vec<_>>());
	let metadata = index
		.documents()
		.iter()
		.map(|d| serde_json::to_string(&d.metadata))
		.collect::<std::result::Result<Vec<_>, _>>()
		.map_err(storage)?;
	let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
		index.vectors().iter().map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>())),
		dim,
	);
	let columns: Vec<ArrayRef> =
		vec![Arc::new(positions), Arc::new(contents), Arc::new(StringArray::from(metadata)), Arc::new(vectors)];
	RecordBatch::try_new(build_arrow_schema(dim), columns).map_err(storage)
}

/// Rename `staged` to `location`. An existing index is moved aside first and
/// put back if the second rename fails.
fn swap_into_place(staged: &Path, location: &Path) -> Result<()> {
	if !location.exists() {
		std::fs::rename(staged, location)?;
		return Ok(());
	}
	let parent = location.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
	let retired = tempfile::Builder::new().prefix(".ragbot-retired-").tempdir_in(parent)?;
	let old = retired.path().join("index");
	std::fs::rename(location, &old)?;
	if let Err(e) = std::fs::rename(staged, location) {
		warn!(location = %location.display(), error = %e, "could not install new index, restoring previous one");
		std::fs::rename(&old, location)?;
		return Err(e.into());
	}
	debug!(location = %location.display(), "replaced previous index");
	Ok(())
}

/// Load the index persisted at `location`.
pub async fn load(location: &Path) -> Result<VectorIndex> {
	if !location.is_dir() {
		return Err(Error::IndexNotFound(location.to_path_buf()));
	}
	let manifest_path = location.join(MANIFEST_FILE);
	let raw = std::fs::read(&manifest_path).map_err(|e| Error::corrupt(location, format!("{MANIFEST_FILE}: {e}")))?;
	let manifest: Manifest =
		serde_json::from_slice(&raw).map_err(|e| Error::corrupt(location, format!("{MANIFEST_FILE}: {e}")))?;
	if manifest.format_version != FORMAT_VERSION {
		return Err(Error::corrupt(location, format!("unsupported format version {}", manifest.format_version)));
	}

	let db = connect(location.to_string_lossy().as_ref()).execute().await.map_err(storage)?;
	let table = db
		.open_table(TABLE_NAME)
		.execute()
		.await
		.map_err(|e| Error::corrupt(location, format!("table {TABLE_NAME}: {e}")))?;
	let rows = table.count_rows(None).await.map_err(storage)?;
	if rows != manifest.count {
		return Err(Error::corrupt(location, format!("manifest lists {} documents, table has {rows}", manifest.count)));
	}

	let mut entries: Vec<(i32, Document, Vec<f32>)> = Vec::with_capacity(rows);
	if rows > 0 {
		let mut stream = table.query().limit(rows).execute().await.map_err(storage)?;
		while let Some(batch) = stream.try_next().await.map_err(storage)? {
			read_batch(&batch, location, &mut entries)?;
		}
	}
	entries.sort_by_key(|(position, _, _)| *position);
	if entries.iter().enumerate().any(|(i, (p, _, _))| usize::try_from(*p).ok() != Some(i)) {
		return Err(Error::corrupt(location, "document positions are not contiguous"));
	}

	let (documents, vectors) = entries.into_iter().map(|(_, d, v)| (d, v)).unzip();
	let index = VectorIndex::from_parts(manifest.domain_id, manifest.dimension, vectors, documents)
		.map_err(|e| Error::corrupt(location, e.to_string()))?;
	info!(domain = index.domain_id(), documents = index.len(), location = %location.display(), "loaded vector index");
	Ok(index)
}

fn read_batch(batch: &RecordBatch, location: &Path, out: &mut Vec<(i32, Document, Vec<f32>)>) -> Result<()> {
	let missing = |name: &str| Error::corrupt(location, format!("column {name} missing or mistyped"));
	let positions = batch
		.column_by_name("position")
		.and_then(|c| c.as_primitive_opt::<Int32Type>())
		.ok_or_else(|| missing("position"))?;
	let contents = batch.column_by_name("content").and_then(|c| c.as_string_opt::<i32>()).ok_or_else(|| missing("content"))?;
	let metadata = batch.column_by_name("metadata").and_then(|c| c.as_string_opt::<i32>()).ok_or_else(|| missing("metadata"))?;
	let vectors = batch.column_by_name("vector").and_then(|c| c.as_fixed_size_list_opt()).ok_or_else(|| missing("vector"))?;

	for i in 0..batch.num_rows() {
		if vectors.is_null(i) {
			return Err(Error::corrupt(location, format!("row {i} has no vector")));
		}
		let values = vectors.value(i);
		let vector = values.as_primitive_opt::<Float32Type>().ok_or_else(|| missing("vector"))?.values().to_vec();
		let meta: Meta = serde_json::from_str(metadata.value(i))
			.map_err(|e| Error::corrupt(location, format!("row {i} metadata: {e}")))?;
		out.push((positions.value(i), Document::with_metadata(contents.value(i), meta), vector));
	}
	Ok(())
}
