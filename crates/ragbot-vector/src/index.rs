use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use ragbot_core::error::{Error, Result};
use ragbot_core::traits::Embedder;
use ragbot_core::types::{Document, RetrievalResult};

pub const DEFAULT_TOP_K: usize = 5;

/// Embedded documents of one domain.
///
/// `vectors[i]` is the embedding of `documents[i]`; every vector has
/// `dimension` components. Immutable once built or loaded, so it can be shared
/// behind an `Arc` by concurrent searches.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    domain_id: String,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    documents: Vec<Document>,
}

/// A search hit together with its L2 distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub distance: f32,
    pub document: Document,
}

impl VectorIndex {
    /// Assemble an index from parallel arrays, checking the shape invariant.
    pub fn from_parts(
        domain_id: impl Into<String>,
        dimension: usize,
        vectors: Vec<Vec<f32>>,
        documents: Vec<Document>,
    ) -> Result<Self> {
        if vectors.len() != documents.len() {
            return Err(Error::Storage(format!("{} vectors for {} documents", vectors.len(), documents.len())));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(Error::DimensionMismatch { expected: dimension, actual: bad.len() });
        }
        Ok(Self { domain_id: domain_id.into(), dimension, vectors, documents })
    }

    /// Embed every document's content. Any provider failure aborts the build.
    pub fn build(domain_id: impl Into<String>, documents: Vec<Document>, embedder: &dyn Embedder) -> Result<Self> {
        let domain_id = domain_id.into();
        let dimension = embedder.dim();
        info!(domain = %domain_id, documents = documents.len(), dimension, "building vector index");

        let pb = ProgressBar::new(documents.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%)")
                .map(|s| s.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        let mut vectors = Vec::with_capacity(documents.len());
        for document in &documents {
            let vector = embedder
                .embed(&document.content)
                .map_err(|e| Error::Embedding(format!("{e:#}")))?;
            if vector.len() != dimension {
                return Err(Error::Embedding(format!(
                    "provider returned {} dimensions, expected {dimension}",
                    vector.len()
                )));
            }
            vectors.push(vector);
            pb.inc(1);
        }
        pb.finish_and_clear();
        Self::from_parts(domain_id, dimension, vectors, documents)
    }

    pub fn domain_id(&self) -> &str { &self.domain_id }
    pub fn dimension(&self) -> usize { self.dimension }
    pub fn len(&self) -> usize { self.documents.len() }
    pub fn is_empty(&self) -> bool { self.documents.is_empty() }
    pub fn documents(&self) -> &[Document] { &self.documents }
    pub fn vectors(&self) -> &[Vec<f32>] { &self.vectors }

    /// The `top_k` documents closest to `query`, nearest first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<RetrievalResult> {
        Ok(self.search_scored(query, top_k)?.into_iter().map(|hit| hit.document).collect())
    }

    /// Like `search`, keeping the distances. Equal distances keep insertion order.
    pub fn search_scored(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        let hits = self.nearest(query, top_k)?;
        Ok(hits
            .into_iter()
            .filter_map(|(position, distance)| match self.documents.get(position) {
                Some(document) => Some(ScoredDocument { distance, document: document.clone() }),
                None => {
                    warn!(domain = %self.domain_id, position, "search hit has no backing document, skipping");
                    None
                }
            })
            .collect())
    }

    fn nearest(&self, query: &[f32], top_k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch { expected: self.dimension, actual: query.len() });
        }
        let mut hits: Vec<(usize, f32)> =
            self.vectors.iter().map(|v| l2_distance(query, v)).enumerate().collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits.truncate(top_k);
        Ok(hits)
    }
}

pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}
