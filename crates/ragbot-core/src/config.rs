//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_RETRIEVAL__TOP_K=3`). Provides helpers to expand `~` and `${VAR}` and
//! to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::{ChunkingConfig, TabularSchema};
use crate::error::{Error, Result};
use crate::types::GenerationParams;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load with config files looked up in `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The fully typed view of the merged configuration.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalSettings,
    pub generation: GenerationSettings,
    pub prompt: PromptSettings,
    pub history: HistorySettings,
    pub domains: BTreeMap<String, DomainConfig>,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.domains.is_empty() {
            return Err(Error::InvalidConfig("no domains configured".into()));
        }
        if self.retrieval.history_window == 0 {
            return Err(Error::InvalidConfig("retrieval.history_window must be at least 1".into()));
        }
        for (id, domain) in &self.domains {
            if domain.source.trim().is_empty() || domain.index_dir.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("domain '{id}' needs both a source and an index_dir")));
            }
        }
        Ok(())
    }

    pub fn base_dir(&self) -> PathBuf { expand_path(&self.data.base_dir) }

    /// Resolve a configured path against `data.base_dir`.
    pub fn resolve(&self, p: &str) -> PathBuf { resolve_with_base(&self.base_dir(), p) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Directory that relative source, index and log paths are resolved against.
    pub base_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self { Self { base_dir: ".".to_string() } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
    pub model_dir: Option<String>,
    pub max_len: usize,
    pub use_fake: bool,
    pub fake_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "paraphrase-multilingual-mpnet-base-v2".to_string(),
            model_dir: None,
            max_len: 128,
            use_fake: false,
            fake_dim: 768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Number of most recent turns replayed into the prompt.
    pub history_window: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { top_k: 5, history_window: 3 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// OpenAI-compatible endpoint, e.g. a local llama.cpp server.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl GenerationSettings {
    pub fn params(&self) -> GenerationParams {
        GenerationParams { max_tokens: self.max_tokens, temperature: self.temperature, top_p: self.top_p }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            model: "Hermes-3-Llama-3.1-8B.Q4_K_M".to_string(),
            api_key: None,
            timeout_secs: Some(120),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        }
    }
}

pub const DEFAULT_REFUSAL: &str =
    "Não consigo responder a essa questão, experimente reformular a questão ou mudar de tema.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Leading system messages, in order.
    pub instructions: Vec<String>,
    pub context_prefix: String,
    /// Answer returned without calling the model when retrieval finds nothing.
    pub fallback_answer: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            instructions: vec![
                format!(
                    "És um chatbot para alunos da Universidade Aberta. Caso precises de mais dados para \
                     procurares a resposta, pergunta ao utilizador. Responde estritamente com base no \
                     contexto fornecido e de forma curta e simpática. Caso a resposta não esteja no \
                     contexto, responde '{DEFAULT_REFUSAL}' Não utilizes conhecimento prévio. Responde \
                     em português de Portugal e evita o gerúndio."
                ),
                "Sempre que te for possível enumerar dados ou factos, por favor fá-lo. Isto é, sempre \
                 que te perguntarem 'quantos/quais/onde/quando etc.' responde com números"
                    .to_string(),
            ],
            context_prefix: "Contexto: ".to_string(),
            fallback_answer: "Contexto relevante não encontrado.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub enabled: bool,
    pub log_path: String,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self { enabled: true, log_path: "data/historico/history.txt".to_string() }
    }
}

/// How a domain's source material is chunked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKind {
    Text,
    Tabular {
        #[serde(default)]
        schema: TabularSchema,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub label: String,
    pub source: String,
    pub index_dir: String,
    #[serde(flatten)]
    pub kind: SourceKind,
}

impl Default for Settings {
    fn default() -> Self {
        let domain = |label: &str, source: &str, index_dir: &str, kind: SourceKind| DomainConfig {
            label: label.to_string(),
            source: source.to_string(),
            index_dir: index_dir.to_string(),
            kind,
        };
        let mut domains = BTreeMap::new();
        domains.insert(
            "1".to_string(),
            domain("Aspetos administrativos da UAb", "data/context/UAB.txt", "data/index/uab", SourceKind::Text),
        );
        domains.insert(
            "2".to_string(),
            domain("Modelo Pedagógico Virtual", "data/context/MPV.txt", "data/index/mpv", SourceKind::Text),
        );
        domains.insert(
            "3".to_string(),
            domain(
                "Conteúdos programáticos das UCs do 3.º ano da LEI",
                "data/context/Dados_UCS.json",
                "data/index/ucs",
                SourceKind::Tabular { schema: TabularSchema::default() },
            ),
        );
        Self {
            data: DataSettings::default(),
            embedding: EmbeddingSettings::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalSettings::default(),
            generation: GenerationSettings::default(),
            prompt: PromptSettings::default(),
            history: HistorySettings::default(),
            domains,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
