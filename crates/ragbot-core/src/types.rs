//! Domain types shared by the chunker, the vector index and the chat pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Document metadata. Ordered so that persisted indexes are byte-stable.
pub type Meta = BTreeMap<String, String>;

/// A bounded passage of source material, the unit that gets embedded.
///
/// Produced by the chunkers, stored inside a vector index and handed back by
/// the retriever. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Meta,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), metadata: Meta::new() }
    }

    pub fn with_metadata(content: impl Into<String>, metadata: Meta) -> Self {
        Self { content: content.into(), metadata }
    }
}

/// Documents ranked by ascending distance. Empty means "no relevant context".
pub type RetrievalResult = Vec<Document>;

/// Identifier of a knowledge domain (`"1"`, `"2"`, `"3"` in the stock setup).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(String);

impl DomainId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for DomainId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message as sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self { Self { role: Role::System, content: content.into() } }
    pub fn user(content: impl Into<String>) -> Self { Self { role: Role::User, content: content.into() } }
    pub fn assistant(content: impl Into<String>) -> Self { Self { role: Role::Assistant, content: content.into() } }
}

/// Sampling parameters forwarded to the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { max_tokens: 250, temperature: 0.2, top_p: 0.9 }
    }
}
