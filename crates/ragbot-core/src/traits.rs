/// Maps text to a fixed-dimension vector. Must be deterministic for identical
/// input so that index search stays reproducible.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Counts tokens the way the embedding model's tokenizer would.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Whitespace word count. Additive over newline-terminated pieces, which is
/// what the tabular chunker relies on when no model tokenizer is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count(&self, text: &str) -> usize { text.split_whitespace().count() }
}
