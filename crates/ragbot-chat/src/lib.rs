//! ragbot-chat
//!
//! The question-answering pipeline on top of the vector indexes: a registry
//! that lazily loads or builds one index per domain, a retriever, the prompt
//! assembler, conversation history and the request-level `ChatService`.

pub mod generation;
pub mod history_log;
pub mod openai;
pub mod prompt;
pub mod registry;
pub mod retriever;
pub mod service;
pub mod session;

pub use generation::Generator;
pub use history_log::HistoryLog;
pub use openai::OpenAiCompatGenerator;
pub use prompt::PromptAssembler;
pub use registry::IndexRegistry;
pub use retriever::Retriever;
pub use service::{ChatRequest, ChatResponse, ChatService};
pub use session::ConversationHistory;
