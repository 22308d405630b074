use std::sync::Arc;

use tracing::debug;

use ragbot_core::error::{Error, Result};
use ragbot_core::traits::Embedder;
use ragbot_core::types::RetrievalResult;

use crate::registry::IndexRegistry;

/// Finds the documents of a domain closest to a natural-language query.
pub struct Retriever {
    registry: Arc<IndexRegistry>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    pub fn new(registry: Arc<IndexRegistry>, top_k: usize) -> Self {
        let embedder = registry.embedder();
        Self { registry, embedder, top_k }
    }

    pub fn registry(&self) -> &Arc<IndexRegistry> { &self.registry }

    pub async fn retrieve(&self, domain_id: &str, query: &str) -> Result<RetrievalResult> {
        self.retrieve_top_k(domain_id, query, self.top_k).await
    }

    /// An unknown domain fails before the query is embedded. The result may be
    /// empty but is never absent.
    pub async fn retrieve_top_k(&self, domain_id: &str, query: &str, top_k: usize) -> Result<RetrievalResult> {
        if !self.registry.contains(domain_id) {
            return Err(Error::UnknownDomain(domain_id.to_string()));
        }
        let index = self.registry.ensure_index(domain_id).await?;
        let query_vector = self.embed_query(query).await?;
        let hits = index.search_scored(&query_vector, top_k)?;
        debug!(
            domain = domain_id,
            hits = hits.len(),
            distances = ?hits.iter().map(|h| h.distance).collect::<Vec<_>>(),
            "retrieved context"
        );
        Ok(hits.into_iter().map(|h| h.document).collect())
    }

    /// Model inference is CPU bound, so it runs on the blocking pool.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || embedder.embed(&query))
            .await
            .map_err(|e| Error::Task(format!("query embedding: {e}")))?
            .map_err(|e| Error::Embedding(format!("{e:#}")))
    }
}
