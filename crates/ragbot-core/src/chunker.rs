//! Chunking policies that turn raw source material into `Document`s.
//!
//! Two policies exist: overlapping character windows for prose, and a
//! token-budgeted field accumulator for tabular records (one record = one
//! course unit, possibly split across several documents).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::traits::TokenCounter;
use crate::types::{Document, Meta};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target text window, in characters.
    pub window: usize,
    /// Characters shared by consecutive text windows.
    pub overlap: usize,
    /// Token budget per tabular document.
    pub token_limit: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { window: 700, overlap: 100, token_limit: 1000 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(Error::InvalidConfig("chunking.window must be positive".into()));
        }
        if self.overlap >= self.window {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.window ({})",
                self.overlap, self.window
            )));
        }
        if self.token_limit == 0 {
            return Err(Error::InvalidConfig("chunking.token_limit must be positive".into()));
        }
        Ok(())
    }
}

/// Preferred break points, strongest first. A window ends right after the match.
const SEPARATORS: &[&[char]] = &[&['\n', '\n'], &['\n'], &['.', ' '], &['!', ' '], &['?', ' ']];

/// Splits prose into overlapping windows that prefer natural boundaries.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    window: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(window: usize, overlap: usize) -> Result<Self> {
        ChunkingConfig { window, overlap, token_limit: 1 }.validate()?;
        Ok(Self { window, overlap })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.window, config.overlap)
    }

    pub fn chunk(&self, text: &str) -> Vec<Document> {
        let chars: Vec<char> = text.chars().collect();
        let mut documents = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let hard_end = (start + self.window).min(chars.len());
            let end = if hard_end == chars.len() { hard_end } else { self.find_break(&chars, start, hard_end) };
            let piece: String = chars[start..end].iter().collect();
            if !piece.trim().is_empty() {
                documents.push(Document::new(piece));
            }
            if end >= chars.len() {
                break;
            }
            start = self.next_start(&chars, start, end);
        }
        documents
    }

    /// Last natural boundary in the second half of the window, or a hard cut.
    fn find_break(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        // Ending past `min_end` keeps the next window strictly ahead of `start`.
        let min_end = (start + (self.window / 2).max(self.overlap + self.overlap / 2 + 1)).min(hard_end);
        for sep in SEPARATORS {
            let found = (min_end..=hard_end)
                .rev()
                .find(|&end| end >= start + sep.len() && chars[end - sep.len()..end] == **sep);
            if let Some(end) = found {
                return end;
            }
        }
        (min_end..=hard_end)
            .rev()
            .find(|&end| end > start && chars[end - 1].is_whitespace())
            .unwrap_or(hard_end)
    }

    /// Step back `overlap` characters from `end`, then to the start of that word.
    fn next_start(&self, chars: &[char], start: usize, end: usize) -> usize {
        let target = end - self.overlap;
        let floor = target.saturating_sub(self.overlap / 2).max(start + 1);
        (floor..=target).rev().find(|&i| chars[i - 1].is_whitespace()).unwrap_or(target)
    }
}

/// One column of a tabular record and how it is rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub column: String,
    pub label: String,
    /// Placeholder used when the record has no value for `column`.
    pub missing: String,
}

impl FieldSpec {
    fn new(column: &str, label: &str, missing: &str) -> Self {
        Self { column: column.to_string(), label: label.to_string(), missing: missing.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabularSchema {
    pub title_column: String,
    pub title_label: String,
    pub title_missing: String,
    /// Metadata key under which each document records its title.
    pub key_name: String,
    pub fields: Vec<FieldSpec>,
}

impl Default for TabularSchema {
    fn default() -> Self {
        Self {
            title_column: "Nome da Unidade Curricular".to_string(),
            title_label: "Unidade Curricular".to_string(),
            title_missing: "Unidade Curricular não identificada".to_string(),
            key_name: "unit_name".to_string(),
            fields: vec![
                FieldSpec::new("Professor(es)", "Professor(es)", "Professores não encontrados"),
                FieldSpec::new("Código", "Código", "Código não encontrado"),
                FieldSpec::new("ECTS", "ECTS", "ECTS não encontrados"),
                FieldSpec::new("Descrição", "Descrição", "Descrição não encontrada"),
                FieldSpec::new("Competências a Desenvolver", "Competências a Desenvolver", "Competências não encontradas"),
                FieldSpec::new("Temas", "Temas", "Temas não encontrados"),
                FieldSpec::new("Metodologia", "Metodologia", "Metodologia não encontrada"),
                FieldSpec::new("Bibliografia Obrigatória", "Bibliografia", "Bibliografia não encontrada"),
                FieldSpec::new("Outros Recursos", "Recursos", "Recursos não encontrados"),
                FieldSpec::new("Avaliação", "Avaliação", "Avaliação não encontrada"),
                FieldSpec::new("Plano de Trabalho", "Plano de Trabalho", "Plano de Trabalho não encontrado"),
                FieldSpec::new("Calendário Avaliação", "Calendário Avaliação", "Calendário não encontrado"),
            ],
        }
    }
}

/// A row of a tabular source: column name → cell text.
pub type Record = BTreeMap<String, String>;

fn cell<'r>(record: &'r Record, column: &str, missing: &'r str) -> &'r str {
    record.get(column).map(|v| v.trim()).filter(|v| !v.is_empty()).unwrap_or(missing)
}

/// Groups each record's fields into documents that fit a token budget.
///
/// Every document starts with the record's title line and carries the title in
/// its metadata. When the next field would push a document over the budget the
/// document is closed and a new one is seeded with the title and that field. A
/// single field larger than the budget still becomes one (oversized) document.
pub struct TabularChunker<'a> {
    schema: &'a TabularSchema,
    counter: &'a dyn TokenCounter,
    token_limit: usize,
}

impl<'a> TabularChunker<'a> {
    pub fn new(schema: &'a TabularSchema, counter: &'a dyn TokenCounter, token_limit: usize) -> Self {
        Self { schema, counter, token_limit }
    }

    pub fn chunk(&self, records: &[Record]) -> Vec<Document> {
        records.iter().flat_map(|r| self.chunk_record(r)).collect()
    }

    pub fn chunk_record(&self, record: &Record) -> Vec<Document> {
        let title = cell(record, &self.schema.title_column, &self.schema.title_missing);
        let mut metadata = Meta::new();
        metadata.insert(self.schema.key_name.clone(), title.to_string());

        let header = format!("{}: {}\n", self.schema.title_label, title);
        let mut buffer = header.clone();
        let mut tokens = self.counter.count(&buffer);
        let mut has_fields = false;
        let mut documents = Vec::new();

        for field in &self.schema.fields {
            let line = format!("{}: {}\n", field.label, cell(record, &field.column, &field.missing));
            let line_tokens = self.counter.count(&line);
            if has_fields && tokens + line_tokens > self.token_limit {
                documents.push(Document::with_metadata(std::mem::take(&mut buffer), metadata.clone()));
                buffer = format!("{header}{line}");
                tokens = self.counter.count(&buffer);
            } else {
                buffer.push_str(&line);
                tokens += line_tokens;
            }
            has_fields = true;
        }
        if !buffer.trim().is_empty() {
            documents.push(Document::with_metadata(buffer, metadata));
        }
        documents
    }
}
