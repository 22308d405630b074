//! ragbot-embed
//!
//! Sentence embeddings for the retrieval pipeline. `EmbeddingModel` runs an
//! XLM-RoBERTa sentence encoder (e.g. paraphrase-multilingual-mpnet-base-v2)
//! with candle; `FakeEmbedder` is a deterministic hashed bag-of-words used in
//! tests and offline development.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use ragbot_core::config::EmbeddingSettings;
use ragbot_core::traits::{Embedder, TokenCounter, WhitespaceTokenCounter};

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::masked_mean_l2;
pub use tokenize::HfTokenCounter;

pub struct EmbeddingModel { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device, dim: usize, max_len: usize }

impl EmbeddingModel {
    /// Load tokenizer, config and weights from `model_dir`.
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = device::select_device();
        info!(model_dir = %model_dir.display(), "loading sentence encoder");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let vb = load_weights(model_dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dim, max_len, "sentence encoder ready");
        Ok(Self { model, tokenizer, device, dim, max_len })
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize::tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()?;
        if emb.len() != self.dim { return Err(anyhow!("encoder returned {} dims, expected {}", emb.len(), self.dim)); }
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "embedded text");
        Ok(emb)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weights file is not modified while the model is loaded.
        return Ok(unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? });
    }
    let pth = model_dir.join("pytorch_model.bin");
    if pth.exists() {
        return Ok(VarBuilder::from_pth(&pth, DType::F32, device)?);
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize { self.dim }
    fn embed(&self, text: &str) -> Result<Vec<f32>> { self.embed_text(text) }
}

/// Hashed bag-of-words over lower-cased alphanumeric tokens, L2-normalised.
/// Texts sharing words land close together, which is enough for tests.
#[derive(Debug, Clone)]
pub struct FakeEmbedder { dim: usize }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            v[(hasher.finish() % self.dim as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        Ok(v)
    }
}

fn use_fake(settings: &EmbeddingSettings) -> bool {
    settings.use_fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if use_fake(settings) { info!("using FakeEmbedder"); return Ok(Arc::new(FakeEmbedder::new(settings.fake_dim))); }
    let model_dir = resolve_model_dir(settings)?;
    Ok(Arc::new(EmbeddingModel::load(&model_dir, settings.max_len)?))
}

/// Token counter matching `get_default_embedder`: the model tokenizer, or
/// whitespace words when embeddings are faked.
pub fn get_default_token_counter(settings: &EmbeddingSettings) -> Result<Arc<dyn TokenCounter>> {
    if use_fake(settings) { return Ok(Arc::new(WhitespaceTokenCounter)); }
    let model_dir = resolve_model_dir(settings)?;
    Ok(Arc::new(HfTokenCounter::from_file(&model_dir.join("tokenizer.json"))?))
}

pub fn resolve_model_dir(settings: &EmbeddingSettings) -> Result<PathBuf> {
    let candidates = settings.model_dir.iter().cloned()
        .chain(std::env::var("APP_MODEL_DIR").ok())
        .chain(std::env::var("MODEL_DIR").ok())
        .map(ragbot_core::config::expand_path)
        .chain([Path::new("models").join(&settings.model), Path::new("data/llms").join(&settings.model)]);
    for dir in candidates {
        if dir.exists() { info!(model_dir = %dir.display(), "using model dir"); return Ok(dir); }
    }
    Err(anyhow!("Could not locate model directory for {}", settings.model))
}
