use serde::{Deserialize, Serialize};

use ragbot_core::types::ConversationTurn;

/// Ordered question/answer turns of one conversation, oldest first.
///
/// Serializes as a plain JSON array of `{question, answer}` objects so a
/// front end can hand it back on the next request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory(Vec<ConversationTurn>);

impl ConversationHistory {
    pub fn new() -> Self { Self::default() }

    /// The history extended with one more turn.
    #[must_use]
    pub fn append(mut self, question: impl Into<String>, answer: impl Into<String>) -> Self {
        self.0.push(ConversationTurn { question: question.into(), answer: answer.into() });
        self
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        &self.0[self.0.len().saturating_sub(n)..]
    }

    pub fn turns(&self) -> &[ConversationTurn] { &self.0 }
    pub fn last(&self) -> Option<&ConversationTurn> { self.0.last() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
