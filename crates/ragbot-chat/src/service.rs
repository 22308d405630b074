//! The request boundary: one question in, one answer (or one error message)
//! out, with the conversation history threaded through.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ragbot_core::config::Settings;
use ragbot_core::error::{Error, Result};
use ragbot_core::types::{ChatMessage, ConversationTurn, DomainId, GenerationParams};

use crate::generation::Generator;
use crate::history_log::HistoryLog;
use crate::prompt::PromptAssembler;
use crate::registry::IndexRegistry;
use crate::retriever::Retriever;
use crate::session::ConversationHistory;

pub const UNKNOWN_DOMAIN_MESSAGE: &str = "Contexto não encontrado.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    pub domain_id: DomainId,
    #[serde(default)]
    pub history: ConversationHistory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Answer { answer: String, history: ConversationHistory },
    Error { error: String },
}

pub struct ChatService {
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: Arc<dyn Generator>,
    params: GenerationParams,
    timeout: Option<Duration>,
    history_log: Option<HistoryLog>,
}

impl ChatService {
    pub fn new(settings: &Settings, registry: Arc<IndexRegistry>, generator: Arc<dyn Generator>) -> Self {
        let history_log = settings
            .history
            .enabled
            .then(|| HistoryLog::new(settings.resolve(&settings.history.log_path)));
        Self {
            retriever: Retriever::new(registry, settings.retrieval.top_k),
            assembler: PromptAssembler::new(settings.prompt.clone(), settings.retrieval.history_window),
            generator,
            params: settings.generation.params(),
            timeout: settings.generation.timeout_secs.map(Duration::from_secs),
            history_log,
        }
    }

    pub fn retriever(&self) -> &Retriever { &self.retriever }

    /// Answer `question` against `domain_id`, returning the answer and the
    /// history to use for the next turn.
    ///
    /// When retrieval finds nothing the fixed fallback answer is returned, the
    /// generator is not called and the history comes back unchanged.
    pub async fn answer(
        &self,
        domain_id: &str,
        question: &str,
        history: ConversationHistory,
    ) -> Result<(String, ConversationHistory)> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidRequest("question is empty".into()));
        }

        let documents = self.retriever.retrieve(domain_id, question).await?;
        if documents.is_empty() {
            info!(domain = domain_id, "no relevant context, returning fallback answer");
            return Ok((self.assembler.fallback_answer().to_string(), history));
        }

        let messages = self.assembler.assemble(question, &documents, &history);
        let answer = self.generate(&messages).await?;

        if let Some(log) = &self.history_log {
            log.append(&ConversationTurn { question: question.to_string(), answer: answer.clone() }).await;
        }
        let history = history.append(question, answer.as_str());
        Ok((answer, history))
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let call = self.generator.generate(messages, &self.params);
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::Generation(format!("no answer within {}s", limit.as_secs())))?,
            None => call.await,
        };
        outcome.map_err(|e| Error::Generation(format!("{e:#}")))
    }

    /// Run a request and fold any failure into a user-facing message.
    pub async fn handle(&self, request: ChatRequest) -> ChatResponse {
        match self.answer(request.domain_id.as_str(), &request.question, request.history).await {
            Ok((answer, history)) => ChatResponse::Answer { answer, history },
            Err(e) => {
                warn!(domain = %request.domain_id, error = %e, "request failed");
                ChatResponse::Error { error: user_message(&e) }
            }
        }
    }
}

/// The message shown to the user for a failed request.
pub fn user_message(error: &Error) -> String {
    match error {
        Error::UnknownDomain(id) => format!("{UNKNOWN_DOMAIN_MESSAGE} Domínio desconhecido: '{id}'."),
        Error::Embedding(_) => "Não foi possível pesquisar o contexto. Tente novamente mais tarde.".to_string(),
        Error::Generation(_) => "Não foi possível obter uma resposta. Tente novamente mais tarde.".to_string(),
        other => other.to_string(),
    }
}
