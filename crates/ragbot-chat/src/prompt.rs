//! Turns retrieved context and recent history into the message list sent to
//! the generator.

use ragbot_core::config::PromptSettings;
use ragbot_core::types::{ChatMessage, Document};

use crate::session::ConversationHistory;

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    settings: PromptSettings,
    history_window: usize,
}

impl PromptAssembler {
    pub fn new(settings: PromptSettings, history_window: usize) -> Self {
        Self { settings, history_window }
    }

    /// Document contents joined by blank lines, in retrieval order.
    pub fn context_block(documents: &[Document]) -> String {
        documents.iter().map(|d| d.content.as_str()).collect::<Vec<_>>().join("\n\n")
    }

    /// Instructions, then the context, then the last turns as user/assistant
    /// pairs, then the question.
    pub fn assemble(&self, question: &str, documents: &[Document], history: &ConversationHistory) -> Vec<ChatMessage> {
        let recent = history.recent(self.history_window);
        let mut messages = Vec::with_capacity(self.settings.instructions.len() + 2 + recent.len() * 2);
        messages.extend(self.settings.instructions.iter().map(ChatMessage::system));
        messages.push(ChatMessage::system(format!("{}{}", self.settings.context_prefix, Self::context_block(documents))));
        for turn in recent {
            messages.push(ChatMessage::user(turn.question.as_str()));
            messages.push(ChatMessage::assistant(turn.answer.as_str()));
        }
        messages.push(ChatMessage::user(question));
        messages
    }

    pub fn fallback_answer(&self) -> &str { &self.settings.fallback_answer }
}
