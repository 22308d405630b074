use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use std::path::Path;
use tokenizers::Tokenizer;

use ragbot_core::traits::{TokenCounter, WhitespaceTokenCounter};

/// Encode `text` (with special tokens), truncated to `max_len`, as `[1,T]`
/// id and attention-mask tensors.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    if ids.len() > max_len { ids.truncate(max_len); mask.truncate(max_len); }
    let len = ids.len();
    let input_ids = Tensor::from_vec(ids, (1, len), device)?;
    let attention_mask = Tensor::from_vec(mask, (1, len), device)?;
    Ok((input_ids, attention_mask))
}

/// Token counts from the embedding model's own tokenizer (no special tokens).
#[derive(Clone)]
pub struct HfTokenCounter { tokenizer: Tokenizer }

impl HfTokenCounter {
    pub fn new(tokenizer: Tokenizer) -> Self { Self { tokenizer } }

    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(enc) => enc.get_ids().len(),
            Err(e) => {
                tracing::warn!(error = %e, "tokenizer failed, falling back to word count");
                WhitespaceTokenCounter.count(text)
            }
        }
    }
}
