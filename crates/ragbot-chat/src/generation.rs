use async_trait::async_trait;

use ragbot_core::types::{ChatMessage, GenerationParams};

/// A chat-completion backend. Stateless per call.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage], params: &GenerationParams) -> anyhow::Result<String>;
}
