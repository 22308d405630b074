//! Client for any server speaking the OpenAI chat-completions protocol
//! (llama.cpp server, Ollama, vLLM, hosted APIs).

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use ragbot_core::config::GenerationSettings;
use ragbot_core::error::{Error, Result};
use ragbot_core::types::{ChatMessage, GenerationParams};

use crate::generation::Generator;

pub struct OpenAiCompatGenerator {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

impl OpenAiCompatGenerator {
    pub fn new(settings: &GenerationSettings) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()));
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            client,
        })
    }

    fn endpoint(&self) -> String { format!("{}/chat/completions", self.base_url) }
}

#[async_trait]
impl Generator for OpenAiCompatGenerator {
    async fn generate(&self, messages: &[ChatMessage], params: &GenerationParams) -> anyhow::Result<String> {
        let url = self.endpoint();
        let body = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        };
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        debug!(url = %url, messages = messages.len(), "requesting completion");

        let resp = req.send().await.with_context(|| format!("connection to {url} failed"))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("completion API error {status}: {text}"));
        }
        let json: Value = resp.json().await.context("invalid completion response")?;
        let content = json["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| anyhow!("no choices in completion response"))?;
        Ok(content.trim().to_string())
    }
}
