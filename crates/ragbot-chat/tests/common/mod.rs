#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ragbot_chat::{Generator, IndexRegistry};
use ragbot_core::chunker::TabularSchema;
use ragbot_core::config::{DomainConfig, Settings, SourceKind};
use ragbot_core::traits::{Embedder, WhitespaceTokenCounter};
use ragbot_core::types::{ChatMessage, GenerationParams};
use ragbot_embed::FakeEmbedder;

pub const DIM: usize = 64;

/// Fake embedder that counts how often it is called.
#[derive(Default)]
pub struct CountingEmbedder {
    calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

impl Embedder for CountingEmbedder {
    fn dim(&self) -> usize { DIM }
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        FakeEmbedder::new(DIM).embed(text)
    }
}

/// Fake embedder that sleeps on every call and records the highest number of
/// calls that were ever running at once.
pub struct SlowEmbedder {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self { delay, in_flight: AtomicUsize::new(0), peak: AtomicUsize::new(0) }
    }

    pub fn peak(&self) -> usize { self.peak.load(Ordering::SeqCst) }
}

impl Embedder for SlowEmbedder {
    fn dim(&self) -> usize { DIM }
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        FakeEmbedder::new(DIM).embed(text)
    }
}

/// Embeds normally, except that a text equal to `trigger` fails (or panics).
pub struct TriggeredEmbedder {
    trigger: &'static str,
    panic: bool,
}

impl TriggeredEmbedder {
    pub fn failing_on(trigger: &'static str) -> Self { Self { trigger, panic: false } }
    pub fn panicking_on(trigger: &'static str) -> Self { Self { trigger, panic: true } }
}

impl Embedder for TriggeredEmbedder {
    fn dim(&self) -> usize { DIM }
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if text == self.trigger {
            if self.panic {
                panic!("embedder crashed on {text:?}");
            }
            anyhow::bail!("embedder rejected {text:?}");
        }
        FakeEmbedder::new(DIM).embed(text)
    }
}

/// Write `records` as JSON to `<base>/<id>.json` and return a tabular domain
/// using the stock course-unit schema.
pub fn tabular_domain(base: &Path, id: &str, records: serde_json::Value) -> (String, DomainConfig) {
    std::fs::write(base.join(format!("{id}.json")), records.to_string()).expect("write source");
    let config = DomainConfig {
        label: format!("domain {id}"),
        source: format!("{id}.json"),
        index_dir: format!("index/{id}"),
        kind: SourceKind::Tabular { schema: TabularSchema::default() },
    };
    (id.to_string(), config)
}

/// Write `text` to `<base>/<id>.txt` and return a text domain pointing at it.
pub fn text_domain(base: &Path, id: &str, text: &str) -> (String, DomainConfig) {
    std::fs::write(base.join(format!("{id}.txt")), text).expect("write source");
    let config = DomainConfig {
        label: format!("domain {id}"),
        source: format!("{id}.txt"),
        index_dir: format!("index/{id}"),
        kind: SourceKind::Text,
    };
    (id.to_string(), config)
}

pub fn settings(base: &Path, domains: Vec<(String, DomainConfig)>) -> Settings {
    let mut settings = Settings::default();
    settings.data.base_dir = base.to_string_lossy().into_owned();
    settings.embedding.use_fake = true;
    settings.embedding.fake_dim = DIM;
    settings.history.log_path = "historico/history.txt".to_string();
    settings.domains = domains.into_iter().collect();
    settings
}

pub fn registry(settings: &Settings, embedder: Arc<dyn Embedder>) -> Arc<IndexRegistry> {
    Arc::new(IndexRegistry::new(settings, embedder, Arc::new(WhitespaceTokenCounter)))
}

/// Generator double returning a canned answer (or failing) and recording what
/// it was sent.
pub struct ScriptedGenerator {
    answer: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl ScriptedGenerator {
    pub fn answering(answer: &str) -> Self {
        Self { answer: Some(answer.to_string()), delay: None, calls: AtomicUsize::new(0), last_messages: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { answer: None, delay: None, calls: AtomicUsize::new(0), last_messages: Mutex::new(Vec::new()) }
    }

    pub fn slow(answer: &str, delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::answering(answer) }
    }

    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

    pub fn last_messages(&self) -> Vec<ChatMessage> { self.last_messages.lock().unwrap().clone() }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, messages: &[ChatMessage], _params: &GenerationParams) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer.clone().ok_or_else(|| anyhow::anyhow!("model server unavailable"))
    }
}
