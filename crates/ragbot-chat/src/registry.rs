//! Per-domain index lifecycle: load the persisted index, or build it from the
//! domain's source the first time it is needed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::{info, warn};

use ragbot_core::chunker::ChunkingConfig;
use ragbot_core::config::{DomainConfig, Settings, SourceKind};
use ragbot_core::error::{Error, Result};
use ragbot_core::source::load_documents;
use ragbot_core::traits::{Embedder, TokenCounter};
use ragbot_vector::{store, VectorIndex};

type IndexCell = Arc<OnceCell<Arc<VectorIndex>>>;

struct DomainSlot {
    config: DomainConfig,
    source: PathBuf,
    location: PathBuf,
    cell: Mutex<IndexCell>,
    /// Held for the whole of any load, build or rebuild of this domain.
    build_guard: tokio::sync::Mutex<()>,
}

impl DomainSlot {
    fn current(&self) -> IndexCell {
        Arc::clone(&self.cell.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn install(&self, index: Arc<VectorIndex>) {
        *self.cell.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(OnceCell::new_with(Some(index)));
    }
}

/// Owns one lazily initialised `VectorIndex` per configured domain.
///
/// Concurrent requests for the same domain share a single load or build, and
/// at most one build of a domain runs at a time, rebuilds included. A failed
/// attempt leaves the slot empty so a later call can retry.
pub struct IndexRegistry {
    domains: BTreeMap<String, DomainSlot>,
    chunking: ChunkingConfig,
    embedder: Arc<dyn Embedder>,
    counter: Arc<dyn TokenCounter>,
}

impl IndexRegistry {
    pub fn new(settings: &Settings, embedder: Arc<dyn Embedder>, counter: Arc<dyn TokenCounter>) -> Self {
        let domains = settings
            .domains
            .iter()
            .map(|(id, config)| {
                let slot = DomainSlot {
                    config: config.clone(),
                    source: settings.resolve(&config.source),
                    location: settings.resolve(&config.index_dir),
                    cell: Mutex::new(IndexCell::default()),
                    build_guard: tokio::sync::Mutex::new(()),
                };
                (id.clone(), slot)
            })
            .collect();
        Self { domains, chunking: settings.chunking.clone(), embedder, counter }
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> { Arc::clone(&self.embedder) }

    pub fn contains(&self, domain_id: &str) -> bool { self.domains.contains_key(domain_id) }

    /// Configured domains in id order.
    pub fn domains(&self) -> impl Iterator<Item = (&str, &DomainConfig)> {
        self.domains.iter().map(|(id, slot)| (id.as_str(), &slot.config))
    }

    fn slot(&self, domain_id: &str) -> Result<&DomainSlot> {
        self.domains.get(domain_id).ok_or_else(|| Error::UnknownDomain(domain_id.to_string()))
    }

    /// The domain's index, loading or building it on first use.
    pub async fn ensure_index(&self, domain_id: &str) -> Result<Arc<VectorIndex>> {
        let slot = self.slot(domain_id)?;
        let cell = slot.current();
        let index = cell
            .get_or_try_init(|| async {
                let _guard = slot.build_guard.lock().await;
                // A rebuild may have installed a fresh index while we waited.
                if let Some(index) = slot.current().get() {
                    return Ok(Arc::clone(index));
                }
                self.load_or_build(domain_id, slot).await
            })
            .await?;
        Ok(Arc::clone(index))
    }

    /// Ensure every configured domain, in id order.
    pub async fn ensure_all(&self) -> Result<Vec<(String, Arc<VectorIndex>)>> {
        let mut out = Vec::with_capacity(self.domains.len());
        for id in self.domains.keys() {
            out.push((id.clone(), self.ensure_index(id).await?));
        }
        Ok(out)
    }

    /// Discard the persisted index and build a fresh one from source. Waits for
    /// any load or build of the domain already in progress.
    pub async fn rebuild(&self, domain_id: &str) -> Result<Arc<VectorIndex>> {
        let slot = self.slot(domain_id)?;
        let _guard = slot.build_guard.lock().await;
        if tokio::fs::try_exists(&slot.location).await? {
            info!(domain = domain_id, location = %slot.location.display(), "removing persisted index");
            tokio::fs::remove_dir_all(&slot.location).await?;
        }
        let index = Arc::new(self.build_and_save(domain_id, slot).await?);
        slot.install(Arc::clone(&index));
        Ok(index)
    }

    async fn load_or_build(&self, domain_id: &str, slot: &DomainSlot) -> Result<Arc<VectorIndex>> {
        match store::load(&slot.location).await {
            Ok(index) => Ok(Arc::new(index)),
            Err(e) if e.is_index_unusable() => {
                if matches!(e, Error::IndexCorrupt { .. }) {
                    warn!(domain = domain_id, error = %e, "persisted index unusable, rebuilding from source");
                } else {
                    info!(domain = domain_id, location = %slot.location.display(), "no persisted index, building from source");
                }
                let index = self.build_and_save(domain_id, slot).await.map_err(|e| {
                    Error::InvalidConfig(format!(
                        "domain '{domain_id}': cannot build index from {}: {e}",
                        slot.source.display()
                    ))
                })?;
                Ok(Arc::new(index))
            }
            Err(e) => Err(e),
        }
    }

    async fn build_and_save(&self, domain_id: &str, slot: &DomainSlot) -> Result<VectorIndex> {
        let index = build_from_source(
            domain_id.to_string(),
            slot.config.kind.clone(),
            slot.source.clone(),
            self.chunking.clone(),
            Arc::clone(&self.embedder),
            Arc::clone(&self.counter),
        )
        .await?;
        store::save(&index, &slot.location).await?;
        Ok(index)
    }
}

/// Chunk and embed off the async runtime; both are CPU bound.
async fn build_from_source(
    domain_id: String,
    kind: SourceKind,
    source: PathBuf,
    chunking: ChunkingConfig,
    embedder: Arc<dyn Embedder>,
    counter: Arc<dyn TokenCounter>,
) -> Result<VectorIndex> {
    tokio::task::spawn_blocking(move || {
        let documents = load_documents(&kind, &source, &chunking, counter.as_ref())?;
        VectorIndex::build(domain_id, documents, embedder.as_ref())
    })
    .await
    .map_err(|e| Error::Task(format!("index build: {e}")))?
}
