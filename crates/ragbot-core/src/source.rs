//! Loading raw source material for a domain and chunking it into documents.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::chunker::{ChunkingConfig, Record, TabularChunker, TextChunker};
use crate::config::SourceKind;
use crate::error::{Error, Result};
use crate::traits::TokenCounter;
use crate::types::Document;

/// Read and chunk a domain's source according to its kind.
pub fn load_documents(
    kind: &SourceKind,
    path: &Path,
    chunking: &ChunkingConfig,
    counter: &dyn TokenCounter,
) -> Result<Vec<Document>> {
    let documents = match kind {
        SourceKind::Text => {
            let text = read_text_source(path)?;
            TextChunker::from_config(chunking)?.chunk(&text)
        }
        SourceKind::Tabular { schema } => {
            let records = read_records(path)?;
            debug!(records = records.len(), path = %path.display(), "loaded tabular records");
            TabularChunker::new(schema, counter, chunking.token_limit).chunk(&records)
        }
    };
    info!(documents = documents.len(), path = %path.display(), "chunked source");
    Ok(documents)
}

/// A `.txt` file, or every `.txt` file under a directory joined by blank lines.
pub fn read_text_source(path: &Path) -> Result<String> {
    if path.is_dir() {
        let files = list_txt_files(path);
        if files.is_empty() {
            return Err(source_error(path, "directory holds no .txt files"));
        }
        let mut parts = Vec::with_capacity(files.len());
        for file in &files {
            parts.push(read_file_content(file)?);
        }
        Ok(parts.join("\n\n"))
    } else {
        read_file_content(path)
    }
}

/// Records exported from the spreadsheet as a JSON array of objects.
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    let raw = read_file_content(path)?;
    let value: Value = serde_json::from_str(&raw).map_err(|e| source_error(path, e.to_string()))?;
    let Value::Array(rows) = value else {
        return Err(source_error(path, "expected a JSON array of records"));
    };
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match row {
            Value::Object(fields) => Ok(fields
                .into_iter()
                .filter_map(|(column, v)| cell_text(v).map(|text| (column, text)))
                .collect()),
            _ => Err(source_error(path, format!("row {i} is not an object"))),
        })
        .collect()
}

fn cell_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn read_file_content(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            let bytes = fs::read(path).map_err(|e| source_error(path, e.to_string()))?;
            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
        Err(e) => Err(source_error(path, e.to_string())),
    }
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
        .collect();
    txt_files.sort();
    txt_files
}

fn source_error(path: &Path, reason: impl Into<String>) -> Error {
    Error::Source { path: path.to_path_buf(), reason: reason.into() }
}
